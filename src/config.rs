use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::store::MergePolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub keywords: KeywordConfig,
    pub output: OutputConfig,
    pub scraper: ScraperOptions,
    pub queries: Vec<Query>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        Self {
            include: to_strings(&["python", "react", "javascript", "django"]),
            exclude: to_strings(&["php", ".net", "c#", "c++", "linux"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub file_prefix: String,
    /// Append the run date to the file name, giving one file per day.
    pub dated: bool,
    pub merge: MergePolicy,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("."),
            file_prefix: "linkedin_jobs".to_string(),
            dated: true,
            merge: MergePolicy::default(),
        }
    }
}

impl OutputConfig {
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        let name = if self.dated {
            format!("{}_{}.csv", self.file_prefix, date.format("%Y_%m_%d"))
        } else {
            format!("{}.csv", self.file_prefix)
        };
        self.directory.join(name)
    }

    pub fn today_path(&self) -> PathBuf {
        self.path_for(chrono::Local::now().date_naive())
    }
}

/// Browser/worker settings handed to the scraper untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScraperOptions {
    pub headless: bool,
    pub max_workers: usize,
    pub slow_mo_secs: f64,
    pub page_load_timeout_secs: u64,
}

impl Default for ScraperOptions {
    fn default() -> Self {
        Self {
            headless: true,
            max_workers: 1,
            slow_mo_secs: 1.3,
            page_load_timeout_secs: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub query: String,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub apply_link: bool,
    #[serde(default)]
    pub skip_promoted_jobs: bool,
    #[serde(default)]
    pub filters: QueryFilters,
}

impl Query {
    fn entry_level(query: &str) -> Self {
        Self {
            query: query.to_string(),
            locations: to_strings(&["London, England, United Kingdom", "United Kingdom"]),
            limit: default_limit(),
            apply_link: true,
            skip_promoted_jobs: false,
            filters: QueryFilters {
                relevance: Some(Relevance::Recent),
                time: Some(TimeFilter::Day),
                job_type: vec![JobType::FullTime],
                experience: vec![ExperienceLevel::EntryLevel],
            },
        }
    }
}

fn default_limit() -> usize {
    1000
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryFilters {
    pub relevance: Option<Relevance>,
    pub time: Option<TimeFilter>,
    pub job_type: Vec<JobType>,
    pub experience: Vec<ExperienceLevel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Relevance {
    Relevant,
    Recent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimeFilter {
    Any,
    Day,
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobType {
    FullTime,
    PartTime,
    Temporary,
    Contract,
    Internship,
    Volunteer,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExperienceLevel {
    Internship,
    EntryLevel,
    Associate,
    MidSenior,
    Director,
    Executive,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            keywords: KeywordConfig::default(),
            output: OutputConfig::default(),
            scraper: ScraperOptions::default(),
            queries: vec![
                Query::entry_level("Junior Software Developer"),
                Query::entry_level("Software Developer"),
                Query::entry_level("Developer"),
            ],
        }
    }
}

impl Config {
    /// Loads `path`, or the platform default location when `None`.
    /// A missing file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read config file: {}", path.display())),
        }
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.scraper.max_workers == 0 {
            return Err(anyhow!("scraper.max_workers must be at least 1"));
        }
        Ok(config)
    }

    pub fn default_path() -> Result<PathBuf> {
        // Use XDG config directory or fallback
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobsift") {
            Ok(proj_dirs.config_dir().join("config.toml"))
        } else {
            Ok(PathBuf::from("jobsift.toml"))
        }
    }

    pub fn write_default(path: &Path) -> Result<()> {
        if path.exists() {
            return Err(anyhow!("Config already exists at {}", path.display()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&Self::default())?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}
