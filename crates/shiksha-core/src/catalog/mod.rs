//! Index of the games available per grade and subject.
//!
//! The catalog is a fixed lookup table; it never touches the network or the
//! store. `GameLoader` fetches the game files it points at.

pub mod loader;

pub use loader::{GameLoader, LoadError, GAME_CONTENT_TYPE};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::utils::{contains_ignore_case, slugify};

/// Number of recommendations returned.
pub const RECOMMENDATION_LIMIT: usize = 6;

/// Games published per subject.
const GAMES_PER_SUBJECT: u8 = 2;

/// (subject, file prefix) for grades 6 to 10.
const SECONDARY: &[(&str, &str)] = &[
    ("English", "english"),
    ("Odia", "odia"),
    ("Mathematics", "maths"),
    ("Science", "science"),
    ("Social Studies", "social"),
];

/// (subject, file prefix) for grades 11 and 12.
const HIGHER_SECONDARY: &[(&str, &str)] = &[
    ("English", "english"),
    ("Odia", "odia"),
    ("Mathematics", "maths"),
    ("Biology", "biology"),
    ("Physics", "physics"),
    ("Chemistry", "chemistry"),
    ("Computer Science", "computer_science"),
    ("Economics", "economics"),
    ("Commerce", "commerce"),
    ("History", "history"),
    ("Business Mathematics", "business_maths"),
    ("Accountancy", "accountancy"),
    ("Civics", "civics"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct GameCatalogEntry {
    /// File name without extension, e.g. `maths_game1`.
    pub id: String,
    pub grade: u8,
    pub subject: String,
    pub file_name: String,
    pub path: String,
}

impl GameCatalogEntry {
    fn new(grade: u8, subject: &str, prefix: &str, number: u8) -> Self {
        let id = format!("{}_game{}", prefix, number);
        Self {
            file_name: format!("{}.json", id),
            path: format!("/games/grade_{}/{}.json", grade, id),
            id,
            grade,
            subject: subject.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
pub struct SubjectInfo {
    pub id: String,
    pub name: String,
    pub game_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    #[serde(flatten)]
    pub entry: GameCatalogEntry,
    pub reason: String,
    pub priority: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogStats {
    pub total_games: usize,
    pub subjects: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GameCatalog;

impl GameCatalog {
    pub fn new() -> Self {
        Self
    }

    fn subjects(grade: u8) -> &'static [(&'static str, &'static str)] {
        match grade {
            6..=10 => SECONDARY,
            11 | 12 => HIGHER_SECONDARY,
            _ => &[],
        }
    }

    fn entries(grade: u8, subject: &str, prefix: &str) -> impl Iterator<Item = GameCatalogEntry> {
        let subject = subject.to_string();
        let prefix = prefix.to_string();
        (1..=GAMES_PER_SUBJECT).map(move |n| GameCatalogEntry::new(grade, &subject, &prefix, n))
    }

    /// Games for a subject, matched by exact name. Unknown grade or subject
    /// gives an empty list.
    pub fn games_for(&self, grade: u8, subject: &str) -> Vec<GameCatalogEntry> {
        Self::subjects(grade)
            .iter()
            .find(|(name, _)| *name == subject)
            .map(|(name, prefix)| Self::entries(grade, name, prefix).collect())
            .unwrap_or_default()
    }

    pub fn subjects_for(&self, grade: u8) -> Vec<SubjectInfo> {
        Self::subjects(grade)
            .iter()
            .map(|(name, _)| SubjectInfo {
                id: slugify(name),
                name: name.to_string(),
                game_count: GAMES_PER_SUBJECT as usize,
            })
            .collect()
    }

    /// Every game whose subject name contains `keyword`, ignoring case.
    pub fn search(&self, grade: u8, keyword: &str) -> Vec<GameCatalogEntry> {
        Self::subjects(grade)
            .iter()
            .filter(|(name, _)| contains_ignore_case(name, keyword))
            .flat_map(|(name, prefix)| Self::entries(grade, name, prefix))
            .collect()
    }

    /// First game of each subject, ranked by a priority drawn from a
    /// generator seeded with the grade.
    pub fn recommend(&self, grade: u8) -> Vec<Recommendation> {
        self.recommend_seeded(grade, grade as u64)
    }

    /// Same seed, same ranking.
    pub fn recommend_seeded(&self, grade: u8, seed: u64) -> Vec<Recommendation> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut picks: Vec<Recommendation> = Self::subjects(grade)
            .iter()
            .filter_map(|(name, prefix)| Self::entries(grade, name, prefix).next())
            .map(|entry| Recommendation {
                reason: format!("Strengthen {} skills", entry.subject),
                priority: rng.gen::<f64>(),
                entry,
            })
            .collect();

        picks.sort_by(|a, b| b.priority.total_cmp(&a.priority));
        picks.truncate(RECOMMENDATION_LIMIT);
        picks
    }

    pub fn stats(&self, grade: u8, subject: Option<&str>) -> CatalogStats {
        let subjects: Vec<String> = Self::subjects(grade)
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| subject.map_or(true, |s| s == *name))
            .map(str::to_string)
            .collect();
        CatalogStats {
            total_games: subjects.len() * GAMES_PER_SUBJECT as usize,
            subjects,
        }
    }
}
