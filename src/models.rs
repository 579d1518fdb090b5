use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One accepted posting, as stored in the durable spreadsheet.
///
/// Field renames are the column headers other tooling depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Company")]
    pub company: String,
    #[serde(rename = "Place")]
    pub place: String,
    #[serde(rename = "Date")]
    pub posted_date: String,
    #[serde(rename = "Link")]
    pub link: String,
    #[serde(rename = "Experience", default)]
    pub experience_years: Option<u32>,
    #[serde(
        rename = "Stack",
        serialize_with = "serialize_stack",
        deserialize_with = "deserialize_stack",
        default
    )]
    pub stack: Vec<String>,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Applied", deserialize_with = "deserialize_flag", default)]
    pub applied: bool,
}

impl JobRecord {
    pub fn from_posting(posting: Posting, stack: Vec<String>, experience_years: Option<u32>) -> Self {
        Self {
            title: posting.title,
            company: posting.company,
            place: posting.place,
            posted_date: posting.date,
            link: posting.link,
            experience_years,
            stack,
            description: posting.description,
            applied: false,
        }
    }

    pub fn key(&self) -> IdentityKey {
        IdentityKey {
            title: self.title.clone(),
            company: self.company.clone(),
            place: self.place.clone(),
        }
    }

    pub fn stack_display(&self) -> String {
        self.stack.join(STACK_SEPARATOR)
    }
}

/// (title, company, place): two rows with equal keys are the same listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub title: String,
    pub company: String,
    pub place: String,
}

impl std::fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} / {} / {}", self.title, self.company, self.place)
    }
}

/// Payload of a data event from the scraper.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Posting {
    pub title: String,
    pub company: String,
    #[serde(default)]
    pub place: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub description: String,
}

/// Progress counters reported by the scraper; only logged.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeMetrics {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl std::fmt::Display for ScrapeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "processed={} failed={} skipped={}",
            self.processed, self.failed, self.skipped
        )
    }
}

const STACK_SEPARATOR: &str = ", ";

fn serialize_stack<S: Serializer>(stack: &[String], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&stack.join(STACK_SEPARATOR))
}

fn deserialize_stack<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    Ok(raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}

// Spreadsheet apps and hand edits produce TRUE, yes, x, 1 ...
fn deserialize_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_lowercase().as_str() {
        "" | "false" | "no" | "n" | "0" => Ok(false),
        "true" | "yes" | "y" | "1" | "x" => Ok(true),
        other => Err(serde::de::Error::custom(format!(
            "invalid Applied value '{}'",
            other
        ))),
    }
}
