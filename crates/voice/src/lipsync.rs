use crate::prompts::Language;
use serde::{Deserialize, Serialize};

const SECONDS_PER_WORD: f64 = 0.4;
const SECONDS_PER_PAUSE_MARK: f64 = 0.2;
const MIN_DURATION: f64 = 1.0;
const PAUSE_MARKS: &str = ".,!?;:";
const FALLBACK_VOWELS: &str = "aeiouаәеиоөұүыі";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhonemeTiming {
    pub phoneme: String,
    pub start_time: f64,
    pub duration: f64,
}

/// Viseme track for the avatar's mouth animation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LipSyncData {
    #[serde(rename = "type")]
    pub kind: String,
    pub visemes: Vec<String>,
    pub timing: Vec<PhonemeTiming>,
    pub duration: f64,
    pub language: Language,
    pub text: String,
    pub word_count: usize,
}

fn digraph(a: char, b: char) -> Option<&'static str> {
    match (a, b) {
        ('n', 'g') => Some("K"),
        ('s', 'h') | ('c', 'h') => Some("SH"),
        ('t', 'h') => Some("TH"),
        _ => None,
    }
}

fn phoneme(c: char) -> Option<&'static str> {
    let mapped = match c {
        'a' | 'а' | 'ә' => "A",
        'e' | 'е' => "E",
        'i' | 'и' | 'ы' | 'і' => "I",
        'o' | 'о' | 'ө' => "O",
        'u' | 'ұ' | 'ү' => "U",
        'b' | 'p' | 'm' | 'б' | 'п' | 'м' => "B",
        'f' | 'v' | 'в' | 'ф' => "F",
        'w' => "W",
        'l' | 'л' => "L",
        'd' | 't' | 'n' | 'д' | 'т' | 'н' => "D",
        'k' | 'g' | 'к' | 'г' | 'қ' | 'ғ' => "K",
        's' | 'z' | 'с' | 'з' | 'ц' => "S",
        'j' | 'ш' | 'щ' | 'ч' | 'ж' => "SH",
        'r' | 'р' => "R",
        'h' | 'х' | 'һ' => "H",
        'y' | 'й' => "Y",
        'ң' => "N",
        _ => return None,
    };
    Some(mapped)
}

pub fn text_to_visemes(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.to_lowercase().chars().collect();
    let mut visemes = Vec::with_capacity(chars.len());
    let mut i = 0;

    while i < chars.len() {
        if let Some(&next) = chars.get(i + 1) {
            if let Some(p) = digraph(chars[i], next) {
                visemes.push(p.to_string());
                i += 2;
                continue;
            }
        }

        let c = chars[i];
        if let Some(p) = phoneme(c) {
            visemes.push(p.to_string());
        } else if c.is_alphabetic() {
            let p = if FALLBACK_VOWELS.contains(c) { "A" } else { "X" };
            visemes.push(p.to_string());
        } else if c.is_whitespace() {
            visemes.push("P".to_string());
        }
        i += 1;
    }

    visemes
}

pub fn speech_duration(text: &str) -> f64 {
    let words: Vec<&str> = text.split_whitespace().collect();
    let word_count = words.len();
    let pause_marks = text.chars().filter(|c| PAUSE_MARKS.contains(*c)).count();

    let total_chars: usize = words.iter().map(|w| w.chars().count()).sum();
    let mean_word_len = total_chars as f64 / word_count.max(1) as f64;
    let complexity = if mean_word_len > 8.0 {
        1.2
    } else if mean_word_len > 6.0 {
        1.1
    } else {
        1.0
    };

    let duration = word_count as f64 * SECONDS_PER_WORD * complexity
        + pause_marks as f64 * SECONDS_PER_PAUSE_MARK;
    duration.max(MIN_DURATION)
}

fn base_duration(phoneme: &str) -> f64 {
    match phoneme {
        "A" | "E" | "I" | "O" | "U" => 0.15,
        "B" | "F" | "W" => 0.12,
        "L" | "R" | "Y" => 0.10,
        "P" => 0.08,
        _ => 0.10,
    }
}

/// Lays phonemes end to end, then scales them to fill `total_duration`.
pub fn timing(visemes: &[String], total_duration: f64) -> Vec<PhonemeTiming> {
    let raw_total: f64 = visemes.iter().map(|p| base_duration(p)).sum();
    if raw_total <= 0.0 {
        return Vec::new();
    }
    let scale = total_duration / raw_total;

    let mut start = 0.0;
    visemes
        .iter()
        .map(|p| {
            let duration = base_duration(p);
            let entry = PhonemeTiming {
                phoneme: p.clone(),
                start_time: start * scale,
                duration: duration * scale,
            };
            start += duration;
            entry
        })
        .collect()
}

pub fn generate(text: &str, language: Language) -> LipSyncData {
    let visemes = text_to_visemes(text);
    let duration = speech_duration(text);

    LipSyncData {
        kind: "visemes".to_string(),
        timing: timing(&visemes, duration),
        visemes,
        duration,
        language,
        text: text.to_string(),
        word_count: text.split_whitespace().count(),
    }
}
