use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// Read the environment from `APP_ENV`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var("APP_ENV")
            .ok()
            .and_then(|value| Self::parse(&value))
            .unwrap_or_default()
    }

    /// Parse from a string, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "development" | "dev" => Some(Self::Development),
            "test" => Some(Self::Test),
            "production" | "prod" => Some(Self::Production),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }

    pub fn is_development(&self) -> bool {
        *self == Self::Development
    }

    pub fn is_test(&self) -> bool {
        *self == Self::Test
    }

    pub fn is_production(&self) -> bool {
        *self == Self::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load the first dotenv file found for the current `APP_ENV`.
///
/// Lookup order is `.env.<env>`, `.env`, `../.env.<env>`, `../.env`.
/// Variables already set in the process environment win. Runs before
/// logging is set up, so reporting the result is left to the caller.
pub fn load_env() -> Option<PathBuf> {
    load_env_from(Path::new("."), Environment::from_env())
}

/// Load the first dotenv file found relative to `base`.
pub fn load_env_from(base: &Path, env: Environment) -> Option<PathBuf> {
    candidate_paths(base, env)
        .into_iter()
        .find(|path| dotenvy::from_path(path).is_ok())
}

fn candidate_paths(base: &Path, env: Environment) -> Vec<PathBuf> {
    let scoped = format!(".env.{}", env);
    vec![
        base.join(&scoped),
        base.join(".env"),
        base.join("..").join(&scoped),
        base.join("..").join(".env"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_environment() {
        assert_eq!(Environment::parse("production"), Some(Environment::Production));
        assert_eq!(Environment::parse("PROD"), Some(Environment::Production));
        assert_eq!(Environment::parse("test"), Some(Environment::Test));
        assert_eq!(Environment::parse("dev"), Some(Environment::Development));
        assert_eq!(Environment::parse("staging"), None);
    }

    #[test]
    fn test_candidate_order() {
        let paths = candidate_paths(Path::new("/app"), Environment::Test);
        assert_eq!(paths[0], PathBuf::from("/app/.env.test"));
        assert_eq!(paths[1], PathBuf::from("/app/.env"));
        assert_eq!(paths[2], PathBuf::from("/app/../.env.test"));
        assert_eq!(paths[3], PathBuf::from("/app/../.env"));
    }

    #[test]
    fn test_load_env_prefers_scoped_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("app");
        std::fs::create_dir(&base).unwrap();
        std::fs::write(base.join(".env"), "CONVEYOR_DOTENV_PLAIN=1\n").unwrap();
        std::fs::write(base.join(".env.test"), "CONVEYOR_DOTENV_SCOPED=1\n").unwrap();

        let loaded = load_env_from(&base, Environment::Test);
        assert_eq!(loaded, Some(base.join(".env.test")));
        assert_eq!(std::env::var("CONVEYOR_DOTENV_SCOPED").as_deref(), Ok("1"));
        assert!(std::env::var("CONVEYOR_DOTENV_PLAIN").is_err());

        std::env::remove_var("CONVEYOR_DOTENV_SCOPED");
    }

    #[test]
    fn test_load_env_falls_back_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("app");
        std::fs::create_dir(&base).unwrap();
        std::fs::write(dir.path().join(".env"), "CONVEYOR_DOTENV_PARENT=1\n").unwrap();

        let loaded = load_env_from(&base, Environment::Development);
        assert_eq!(loaded, Some(base.join("..").join(".env")));
        assert_eq!(std::env::var("CONVEYOR_DOTENV_PARENT").as_deref(), Ok("1"));

        std::env::remove_var("CONVEYOR_DOTENV_PARENT");
    }

    #[test]
    fn test_load_env_none_found() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("empty");
        std::fs::create_dir(&base).unwrap();

        assert_eq!(load_env_from(&base, Environment::Production), None);
    }
}
