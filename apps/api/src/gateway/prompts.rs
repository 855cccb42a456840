// Prompt templates for the remote analysis gateway.
// Placeholders are filled with llm_client::prompts::fill.

pub const PERSONA_PROMPT: &str = r#"You are an expert in creating realistic interviewer personas for interview simulations.

Based on the company, role, and industry provided, create a detailed description of the interviewer persona. Include their background, personality, and interviewing style. The persona should be believable and relevant to the specified context.

Company: {company}
Role: {role}
Industry: {industry}

OUTPUT SCHEMA (return exactly this structure):
{"persona_description": "string"}"#;

pub const FEEDBACK_PROMPT: &str = r#"You are coaching an interviewee in real time. Based on the interviewer's question, the interviewee's response, the interviewer's persona, and the job description, give concise and constructive feedback that helps the interviewee improve their answer.

Interviewer Persona: {persona}
Job Description: {job_description}
Interviewer Question: {question}
Interviewee Response: {answer}

{language_instruction}"#;

pub const COMPETENCY_PROMPT: &str = r#"You are an expert interview coach specializing in competency-based assessments.

First, identify the primary competency being evaluated by the interview question (for example Strategic Thinking, Leadership, Coaching & Facilitation, Data-Driven Thinking, Communication, Teamwork).
Then evaluate how effectively the response demonstrated this competency.

ROLE CONTEXT:
Role: {role}
Industry: {industry}

INTERVIEW EXCHANGE:
Question: {question}
Response: {answer}

OUTPUT SCHEMA (return exactly this structure):
{
  "competency": "string",
  "assessment": "string",
  "score": 1 | 2 | 3 | 4 | 5,
  "suggestions": ["string"]
}

RULES:
1. score is an integer: 1 is poor, 5 is excellent
2. suggestions are specific changes to this answer, not generic advice
3. {language_instruction} Keep the JSON keys in English."#;

pub const STAR_PROMPT: &str = r#"You are an expert interview coach. Evaluate the response using the STAR method (Situation, Task, Action, Result).

ROLE CONTEXT:
Role: {role}
Industry: {industry}

INTERVIEW EXCHANGE:
Question: {question}
Response: {answer}

OUTPUT SCHEMA (return exactly this structure):
{
  "overall_feedback": "string",
  "star_assessment": {
    "situation": "string",
    "task": "string",
    "action": "string",
    "result": "string"
  },
  "suggestions": ["string"]
}

RULES:
1. For each STAR part, say how well the response covered it
2. {language_instruction} Keep the JSON keys in English."#;
