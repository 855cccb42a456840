//! Static question table: language → role → ordered prompts.
//!
//! Lookup falls back from (language, role) to (language, General) to
//! (English, General). Nothing here is mutated at runtime.

use serde::Serialize;

pub const GENERAL_ROLE: &str = "General";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    En,
    Ja,
    Zh,
    Ko,
    Es,
}

impl Language {
    pub const DEFAULT: Language = Language::En;

    /// Accepts ISO codes (`ja`, `ja-JP`) and the names used by the setup form.
    pub fn parse(raw: &str) -> Option<Language> {
        let lowered = raw.trim().to_ascii_lowercase();
        let primary = lowered.split(['-', '_']).next().unwrap_or_default();
        match primary {
            "en" | "english" => Some(Language::En),
            "ja" | "japanese" => Some(Language::Ja),
            "zh" | "mandarin" | "chinese" => Some(Language::Zh),
            "ko" | "korean" => Some(Language::Ko),
            "es" | "spanish" => Some(Language::Es),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Ja => "Japanese",
            Language::Zh => "Mandarin Chinese",
            Language::Ko => "Korean",
            Language::Es => "Spanish",
        }
    }

    fn roles(self) -> &'static [(&'static str, &'static [&'static str])] {
        match self {
            Language::En => EN,
            Language::Ja => JA,
            Language::Zh => ZH,
            Language::Ko => KO,
            Language::Es => ES,
        }
    }
}

/// Language name for LLM prompts. Unknown values pass through untouched;
/// blank means English.
pub fn prompt_language(raw: &str) -> String {
    if raw.trim().is_empty() {
        return Language::DEFAULT.display_name().to_string();
    }
    Language::parse(raw)
        .map(|l| l.display_name().to_string())
        .unwrap_or_else(|| raw.trim().to_string())
}

/// The question sequence a session walks through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuestionSet {
    pub language: Language,
    pub role: &'static str,
    #[serde(skip)]
    pub prompts: &'static [&'static str],
}

impl QuestionSet {
    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn get(&self, index: usize) -> Option<&'static str> {
        self.prompts.get(index).copied()
    }
}

/// Resolves the question sequence for a scenario. Role keys match
/// case-insensitively after trimming.
pub fn question_set(language: &str, role: &str) -> QuestionSet {
    let resolved = Language::parse(language)
        .and_then(|lang| {
            find_role(lang, role)
                .or_else(|| find_role(lang, GENERAL_ROLE))
                .map(|(key, prompts)| (lang, key, prompts))
        })
        .or_else(|| {
            find_role(Language::DEFAULT, GENERAL_ROLE).map(|(key, prompts)| (Language::DEFAULT, key, prompts))
        });

    match resolved {
        Some((language, role, prompts)) => QuestionSet {
            language,
            role,
            prompts,
        },
        None => QuestionSet {
            language: Language::DEFAULT,
            role: GENERAL_ROLE,
            prompts: EN_GENERAL,
        },
    }
}

fn find_role(
    language: Language,
    role: &str,
) -> Option<(&'static str, &'static [&'static str])> {
    let wanted = role.trim();
    language
        .roles()
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(wanted))
        .copied()
}

const EN_GENERAL: &[&str] = &[
    "Can you tell me a little about yourself?",
    "What are your biggest strengths?",
    "What are your biggest weaknesses?",
    "Tell me about a time you faced a significant challenge at work and how you handled it.",
    "Where do you see yourself in 5 years?",
    "Why are you interested in this role and our company?",
    "Do you have any questions for me?",
];

const EN: &[(&str, &[&str])] = &[
    (GENERAL_ROLE, EN_GENERAL),
    (
        "Software Engineer",
        &[
            "Walk me through the most technically challenging project you have worked on.",
            "Tell me about a production incident you debugged. How did you find the root cause?",
            "How do you handle disagreements in code review?",
            "Describe a design trade-off you made and how you decided.",
            "How do you keep up with new technologies, and how have you introduced one to your team?",
            "Do you have any questions for me?",
        ],
    ),
    (
        "Product Manager",
        &[
            "Tell me about a product you took from idea to launch.",
            "How do you decide what goes on the roadmap when everything seems urgent?",
            "Describe a time you used data to change a product decision.",
            "Tell me about a disagreement with engineering and how you resolved it.",
            "How do you measure whether a feature is successful?",
            "Do you have any questions for me?",
        ],
    ),
];

const JA: &[(&str, &[&str])] = &[
    (
        GENERAL_ROLE,
        &[
            "自己紹介をお願いできますか？",
            "あなたの最大の強みは何ですか？",
            "あなたの弱みは何ですか？",
            "仕事で大きな困難に直面し、それをどのように乗り越えたか教えてください。",
            "5年後、どのような自分になっていたいですか？",
            "なぜこの職種と当社に興味を持ったのですか？",
            "何か質問はありますか？",
        ],
    ),
    (
        "Software Engineer",
        &[
            "これまでに携わった中で最も技術的に難しかったプロジェクトについて教えてください。",
            "本番環境で発生した障害をどのように調査し、解決しましたか？",
            "コードレビューで意見が対立したとき、どのように対応しますか？",
            "設計上のトレードオフを判断した経験について教えてください。",
            "新しい技術をどのように学び、チームに導入しましたか？",
            "何か質問はありますか？",
        ],
    ),
];

const ZH: &[(&str, &[&str])] = &[(
    GENERAL_ROLE,
    &[
        "请简单介绍一下你自己。",
        "你最大的优点是什么？",
        "你最大的缺点是什么？",
        "请讲一个你在工作中遇到重大挑战并成功应对的经历。",
        "你对五年后的自己有什么规划？",
        "你为什么对这个职位和我们公司感兴趣？",
        "你有什么问题想问我们吗？",
    ],
)];

const KO: &[(&str, &[&str])] = &[(
    GENERAL_ROLE,
    &[
        "간단하게 자기소개 부탁드립니다.",
        "본인의 가장 큰 강점은 무엇인가요?",
        "본인의 약점은 무엇인가요?",
        "업무 중 큰 어려움을 겪었던 경험과 이를 어떻게 해결했는지 말씀해 주세요.",
        "5년 후 본인은 어떤 모습일 것 같나요?",
        "이 직무와 저희 회사에 지원하신 이유는 무엇인가요?",
        "저희에게 궁금한 점이 있으신가요?",
    ],
)];

const ES: &[(&str, &[&str])] = &[(
    GENERAL_ROLE,
    &[
        "¿Puede hablarme un poco de usted?",
        "¿Cuáles son sus mayores fortalezas?",
        "¿Cuáles son sus mayores debilidades?",
        "Hábleme de una ocasión en la que enfrentó un desafío importante en el trabajo y cómo lo manejó.",
        "¿Dónde se ve dentro de cinco años?",
        "¿Por qué le interesa este puesto y nuestra empresa?",
        "¿Tiene alguna pregunta para mí?",
    ],
)];
