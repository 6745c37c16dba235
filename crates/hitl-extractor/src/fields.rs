//! Rule-based CV field extraction
//!
//! Each field is filled independently by its own rule:
//! - Regex patterns: email, phone, LinkedIn and GitHub links
//! - Line heuristics: candidate name from the first lines
//! - Keyword dictionaries: skills (whole text), education and languages
//!   (whole lines)
//!
//! Keyword hits are reported in dictionary order and line hits in reading
//! order, each deduplicated, so the same document always yields the same
//! record.

use std::sync::OnceLock;

use regex::Regex;

use crate::RecordExtractor;
use hitl_core::ExtractedRecord;

// ============================================================================
// Keyword Dictionaries
// ============================================================================

pub const SKILL_KEYWORDS: &[&str] = &[
    "python",
    "java",
    "sql",
    "react",
    "aws",
    "docker",
    "excel",
    "management",
    "communication",
    "marketing",
    "scrum",
    "agile",
    "c++",
    "linux",
    "git",
];

pub const EDUCATION_KEYWORDS: &[&str] = &[
    "master",
    "bachelor",
    "licence",
    "diplôme",
    "phd",
    "doctorat",
    "ingénieur",
    "bts",
    "dut",
    "university",
    "école",
];

pub const LANGUAGE_KEYWORDS: &[&str] = &[
    "anglais",
    "français",
    "espagnol",
    "allemand",
    "arabe",
    "english",
    "french",
    "spanish",
    "german",
    "arabic",
    "bilingue",
    "toeic",
];

/// Lines this long or longer are prose, not a language entry
const MAX_LANGUAGE_LINE_CHARS: usize = 50;

/// Only the first lines of a CV are considered for the name
const NAME_SCAN_LINES: usize = 5;

// ============================================================================
// Patterns
// ============================================================================

struct FieldPatterns {
    email: Regex,
    phone: Regex,
    linkedin: Regex,
    github: Regex,
}

fn patterns() -> &'static FieldPatterns {
    static PATTERNS: OnceLock<FieldPatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| FieldPatterns {
        email: Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}")
            .expect("static email pattern"),
        // French (+33 / 0) and Tunisian (+216) numbers
        phone: Regex::new(r"(\+33|0|\+216)[1-9]([\s.-]?\d{2}){4}").expect("static phone pattern"),
        linkedin: Regex::new(r"(https?://)?(www\.)?linkedin\.com/in/[a-zA-Z0-9_-]+")
            .expect("static linkedin pattern"),
        github: Regex::new(r"(https?://)?(www\.)?github\.com/[a-zA-Z0-9_-]+")
            .expect("static github pattern"),
    })
}

// ============================================================================
// Rule-based Extractor
// ============================================================================

/// Keyword dictionaries used by the extractor
#[derive(Debug, Clone)]
pub struct KeywordSets {
    pub skills: Vec<String>,
    pub education: Vec<String>,
    pub languages: Vec<String>,
}

impl Default for KeywordSets {
    fn default() -> Self {
        let owned = |words: &[&str]| words.iter().map(|w| w.to_string()).collect();
        Self {
            skills: owned(SKILL_KEYWORDS),
            education: owned(EDUCATION_KEYWORDS),
            languages: owned(LANGUAGE_KEYWORDS),
        }
    }
}

/// Regex and keyword based field extractor
#[derive(Debug, Clone)]
pub struct RuleBasedExtractor {
    keywords: KeywordSets,
}

impl RuleBasedExtractor {
    /// Create an extractor with the default dictionaries
    pub fn new() -> Self {
        Self::with_keywords(KeywordSets::default())
    }

    /// Create an extractor with custom dictionaries; entries are lowercased
    pub fn with_keywords(keywords: KeywordSets) -> Self {
        let normalize = |words: Vec<String>| {
            let mut seen = Vec::<String>::new();
            for word in words {
                let word = word.to_lowercase();
                if !word.is_empty() && !seen.contains(&word) {
                    seen.push(word);
                }
            }
            seen
        };

        Self {
            keywords: KeywordSets {
                skills: normalize(keywords.skills),
                education: normalize(keywords.education),
                languages: normalize(keywords.languages),
            },
        }
    }

    pub fn keywords(&self) -> &KeywordSets {
        &self.keywords
    }

    /// First short, digit-free line among the first lines.
    ///
    /// Only ASCII digits disqualify a line; fractions such as `½` and
    /// non-Latin digit scripts do not.
    fn find_name(&self, lines: &[&str]) -> Option<String> {
        lines.iter().take(NAME_SCAN_LINES).find_map(|line| {
            let clean = line.trim();
            let len = clean.chars().count();
            (len > 3 && len < 30 && !clean.chars().any(|c| c.is_ascii_digit()))
                .then(|| clean.to_string())
        })
    }

    fn find_pattern(regex: &Regex, text: &str) -> Option<String> {
        regex.find(text).map(|m| m.as_str().to_string())
    }

    /// Skill keywords occurring anywhere in the text
    fn find_skills(&self, full_text: &str) -> Vec<&str> {
        let lower = full_text.to_lowercase();
        self.keywords
            .skills
            .iter()
            .filter(|kw| lower.contains(kw.as_str()))
            .map(String::as_str)
            .collect()
    }

    /// Trimmed lines containing any of `keywords`, first occurrence kept
    fn matching_lines(
        lines: &[&str],
        keywords: &[String],
        accept: impl Fn(&str) -> bool,
    ) -> Vec<String> {
        let mut found: Vec<String> = Vec::new();
        for line in lines {
            let lower = line.to_lowercase();
            if !keywords.iter().any(|kw| lower.contains(kw.as_str())) || !accept(line) {
                continue;
            }
            let clean = line.trim().to_string();
            if !found.contains(&clean) {
                found.push(clean);
            }
        }
        found
    }
}

impl Default for RuleBasedExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordExtractor for RuleBasedExtractor {
    fn extract(&self, lines: &[&str], full_text: &str) -> ExtractedRecord {
        let mut record = ExtractedRecord::new();
        let patterns = patterns();

        if let Some(name) = self.find_name(lines) {
            record.name = name;
        }
        if let Some(email) = Self::find_pattern(&patterns.email, full_text) {
            record.email = email;
        }
        if let Some(phone) = Self::find_pattern(&patterns.phone, full_text) {
            record.phone = phone;
        }
        if let Some(linkedin) = Self::find_pattern(&patterns.linkedin, full_text) {
            record.linkedin = linkedin;
        }
        if let Some(github) = Self::find_pattern(&patterns.github, full_text) {
            record.github = github;
        }

        record.skills = self.find_skills(full_text).join(", ");
        record.education = Self::matching_lines(lines, &self.keywords.education, |_| true).join(" | ");
        record.languages = Self::matching_lines(lines, &self.keywords.languages, |line| {
            line.chars().count() < MAX_LANGUAGE_LINE_CHARS
        })
        .join(", ");

        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitl_core::NOT_FOUND;

    fn extract(text: &str) -> ExtractedRecord {
        let lines: Vec<&str> = text.lines().collect();
        RuleBasedExtractor::new().extract(&lines, text)
    }

    #[test]
    fn test_name_first_short_line() {
        let record = extract("CV\nMarie Curie\n06 12 34 56 78");
        assert_eq!(record.name, "Marie Curie");
    }

    #[test]
    fn test_name_skips_lines_with_digits() {
        let record = extract("Paris 75001\n  Jean Dupont  \n");
        assert_eq!(record.name, "Jean Dupont");
    }

    #[test]
    fn test_name_digit_rule_is_ascii_only() {
        assert_eq!(extract("Louis XIV 14\nLouis Ⅻ").name, "Louis Ⅻ");
        assert_eq!(extract("Anne ½ Martin").name, "Anne ½ Martin");
    }

    #[test]
    fn test_name_only_first_five_lines() {
        let record = extract("1\n2\n3\n4\n5\nJean Dupont");
        assert_eq!(record.name, NOT_FOUND);
    }

    #[test]
    fn test_email_first_match() {
        let record = extract("contact: a.b@mail.fr / other@example.com");
        assert_eq!(record.email, "a.b@mail.fr");
    }

    #[test]
    fn test_phone_patterns() {
        assert_eq!(extract("Tel: 06 12 34 56 78").phone, "06 12 34 56 78");
        assert_eq!(extract("Tel: +33612345678").phone, "+33612345678");
        assert_eq!(extract("Tel: +216512345678").phone, "+216512345678");
        assert_eq!(extract("Tel: +216 51 23 45 67").phone, NOT_FOUND);
        assert_eq!(extract("Tel: 12345").phone, NOT_FOUND);
    }

    #[test]
    fn test_links_default_to_empty() {
        let record = extract("Jean Dupont");
        assert_eq!(record.linkedin, "");
        assert_eq!(record.github, "");
        assert_eq!(record.email, NOT_FOUND);
    }

    #[test]
    fn test_links() {
        let record = extract(
            "https://www.linkedin.com/in/jean-dupont\ngithub.com/jdupont and more",
        );
        assert_eq!(record.linkedin, "https://www.linkedin.com/in/jean-dupont");
        assert_eq!(record.github, "github.com/jdupont");
    }

    #[test]
    fn test_skills_in_dictionary_order() {
        let record = extract("Docker, PYTHON and Docker again, plus SQL");
        assert_eq!(record.skills, "python, sql, docker");
    }

    #[test]
    fn test_skills_substring_semantics() {
        // "javascript" contains "java", "github" contains "git"
        let record = extract("javascript on github");
        assert_eq!(record.skills, "java, git");
    }

    #[test]
    fn test_education_lines() {
        let record = extract("Master of Science\nBTS Informatique\nMaster of Science\nHobbies");
        assert_eq!(record.education, "Master of Science | BTS Informatique");
    }

    #[test]
    fn test_languages_short_lines_only() {
        let record = extract(
            "Anglais courant\nJ'ai travaillé avec des équipes anglaises et françaises pendant des années\nFrançais natif",
        );
        assert_eq!(record.languages, "Anglais courant, Français natif");
    }

    #[test]
    fn test_custom_keywords_are_normalized() {
        let extractor = RuleBasedExtractor::with_keywords(KeywordSets {
            skills: vec!["Rust".to_string(), "rust".to_string(), String::new()],
            education: vec![],
            languages: vec![],
        });
        assert_eq!(extractor.keywords().skills, vec!["rust"]);

        let record = extractor.extract(&["I write RUST"], "I write RUST");
        assert_eq!(record.skills, "rust");
        assert_eq!(record.education, "");
    }
}
