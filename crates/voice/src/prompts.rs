use serde::{Deserialize, Serialize};
use waypoint_common::LocationContext;

const MAX_PROMPT_ATTRACTIONS: usize = 5;
const MAX_PROMPT_TRANSPORT: usize = 3;

/// Prompt used when the location-aware providers have all failed.
pub const BASIC_SYSTEM_PROMPT: &str =
    "You are a helpful AI assistant. Respond naturally and conversationally. Keep responses concise but helpful.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "kk")]
    Kazakh,
    #[serde(rename = "ru")]
    Russian,
    #[serde(rename = "en")]
    English,
}

impl Language {
    /// Unknown codes fall back to Kazakh.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().as_str() {
            "ru" => Language::Russian,
            "en" => Language::English,
            _ => Language::Kazakh,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Language::Kazakh => "kk",
            Language::Russian => "ru",
            Language::English => "en",
        }
    }

    fn name(&self) -> (&'static str, &'static str) {
        match self {
            Language::Kazakh => ("Kazakh", "Kazakh language (қазақ тілі)"),
            Language::Russian => ("Russian", "Russian language (русский язык)"),
            Language::English => ("English", "English language"),
        }
    }
}

fn base_prompt(language: Language) -> String {
    let (name, full_name) = language.name();
    format!(
        "You are a helpful AI assistant with voice-to-voice capabilities. You can speak naturally and have realistic lip-sync animations. You are designed to be conversational, helpful, and engaging.

IMPORTANT: You must respond in {full_name}. All your responses should be in {name}, using proper {name} grammar and vocabulary.

Key capabilities:
- Voice-to-voice conversation with natural speech in {name}
- Realistic lip-sync animations that match your speech
- Context-aware responses based on conversation history
- Natural, conversational tone suitable for voice interaction in {name}

Guidelines:
- Always respond in {name} language
- Keep responses concise and natural for voice delivery
- Use appropriate pauses and emphasis
- Be helpful and engaging
- Ask follow-up questions when appropriate
- Maintain context throughout the conversation
- Use proper {name} grammar and vocabulary
- Be culturally appropriate for {name} speakers"
    )
}

fn location_block(language: Language, place: &str, local_time: &str, timezone: &str) -> String {
    match language {
        Language::Kazakh => format!(
            "

ЖЕРЛЕСУ КОНТЕКСТІ:
Сіз қазір {place} қаласындасыз. Жергілікті уақыт {local_time} ({timezone}).

Жергілікті гид ретінде сіз көмектесе аласыз:
- Көруге болатын орындар, тамақтану және белсенділік ұсыныстары
- Бағыттар және көлік опциялары
- Жергілікті дәстүрлер, мәдениет және кеңестер
- Ауа-райы және маусымдық ақпарат
- Аймақ туралы тарихи және мәдени түсініктер
- Сатып алу, ойын-сауық және тамақтану ұсыныстары

Пайдаланушылар сұрағанда:
- \"Мұнда не істеуге болады\" немесе \"көруге болатын орындар\" - жергілікті көрікті жерлер мен белсенділіктерді ұсыну
- \"Қайда тамақтануға болады\" - жергілікті ресторандар мен тамақ тәжірибелерін ұсыну
- \"Қалай жүруге болады\" - көлік опциялары мен бағыттарды беру"
        ),
        Language::Russian => format!(
            "

КОНТЕКСТ МЕСТОПОЛОЖЕНИЯ:
Вы сейчас находитесь в городе {place}. Местное время {local_time} ({timezone}).

Как местный гид, вы можете помочь:
- Рекомендации по достопримечательностям, ресторанам и развлечениям
- Направления и транспортные опции
- Местные традиции, культура и советы
- Погода и сезонная информация
- Историческая и культурная информация о регионе
- Рекомендации по шопингу, развлечениям и питанию

Когда пользователи спрашивают:
- \"Что здесь можно делать\" или \"достопримечательности\" - предложить местные достопримечательности и активности
- \"Где поесть\" - предложить местные рестораны и кулинарные впечатления
- \"Как добраться\" - предоставить транспортные опции и направления"
        ),
        Language::English => format!(
            "

LOCATION CONTEXT:
You are currently in {place}. Local time is {local_time} ({timezone}).

As a local guide, you can help with:
- Recommendations for attractions, dining, and activities
- Directions and transportation options
- Local traditions, culture, and tips
- Weather and seasonal information
- Historical and cultural information about the area
- Shopping, entertainment, and dining recommendations

When users ask:
- \"What can I do here\" or \"attractions\" - suggest local attractions and activities
- \"Where to eat\" - recommend local restaurants and culinary experiences
- \"How to get there\" - provide transportation options and directions"
        ),
    }
}

fn attractions_heading(language: Language) -> (&'static str, &'static str) {
    match language {
        Language::Kazakh => (
            "ТАНЫМАЛ ЖЕРГІЛІКТІ КӨРІКТІ ЖЕРЛЕР:",
            "Ұсыныстарда осы көрікті жерлерді қолданыңыз.",
        ),
        Language::Russian => (
            "ПОПУЛЯРНЫЕ МЕСТНЫЕ ДОСТОПРИМЕЧАТЕЛЬНОСТИ:",
            "Используйте эти достопримечательности в рекомендациях.",
        ),
        Language::English => (
            "POPULAR LOCAL ATTRACTIONS:",
            "Use these attractions in your recommendations.",
        ),
    }
}

fn transport_heading(language: Language) -> (&'static str, &'static str) {
    match language {
        Language::Kazakh => (
            "КӨЛІК ОПЦИЯЛАРЫ:",
            "Бағыттар мен жүруге көмектескенде осы ақпаратты пайдаланыңыз.",
        ),
        Language::Russian => (
            "ТРАНСПОРТНЫЕ ОПЦИИ:",
            "Используйте эту информацию, помогая с маршрутами и передвижением.",
        ),
        Language::English => (
            "TRANSPORTATION OPTIONS:",
            "Use this information when helping with directions and getting around.",
        ),
    }
}

/// System prompt for a session in `language`, with the location block
/// appended when the session carries a location.
pub fn system_prompt(language: Language, location: Option<&LocationContext>) -> String {
    let mut prompt = base_prompt(language);

    let Some(location) = location else {
        return prompt;
    };

    let place = if location.city.country.is_empty() {
        location.city.name.clone()
    } else {
        format!("{}, {}", location.city.name, location.city.country)
    };
    prompt.push_str(&location_block(
        language,
        &place,
        &location.local_time,
        &location.timezone,
    ));

    if !location.attractions.is_empty() {
        let list = location
            .attractions
            .iter()
            .take(MAX_PROMPT_ATTRACTIONS)
            .map(|a| format!("- {}: {}", a.name, a.description))
            .collect::<Vec<_>>()
            .join("\n");
        let (heading, footer) = attractions_heading(language);
        prompt.push_str(&format!("\n\n{}\n{}\n\n{}", heading, list, footer));
    }

    if !location.transportation.is_empty() {
        let list = location
            .transportation
            .iter()
            .take(MAX_PROMPT_TRANSPORT)
            .map(|t| {
                format!(
                    "- {}: {} ({}, {})",
                    t.name,
                    t.description,
                    t.estimated_time,
                    t.estimated_cost.as_deref().unwrap_or("Cost varies")
                )
            })
            .collect::<Vec<_>>()
            .join("\n");
        let (heading, footer) = transport_heading(language);
        prompt.push_str(&format!("\n\n{}\n{}\n\n{}", heading, list, footer));
    }

    prompt
}
