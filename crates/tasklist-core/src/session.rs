use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::datastore::{DataStore, LOGIN_KEY, THEME_KEY};
use crate::schema::FieldSet;
use crate::view::SortKey;

const LOGIN_USER: &str = "user";
const LOGIN_PASSWORD: &str = "pass";
const LOGGED_IN_MARKER: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Theme {
    Light,
    Dark,
    #[default]
    Auto,
}

impl FromStr for Theme {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "light" => Ok(Self::Light),
            "dark" => Ok(Self::Dark),
            "auto" => Ok(Self::Auto),
            other => Err(anyhow!("unknown theme: {other} (expected light, dark or auto)")),
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Light => "light",
            Self::Dark => "dark",
            Self::Auto => "auto",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Appearance {
    Light,
    Dark,
}

impl Theme {
    /// `Auto` follows the terminal's `COLORFGBG` hint, light when unknown.
    pub fn resolve(self) -> Appearance {
        match self {
            Self::Light => Appearance::Light,
            Self::Dark => Appearance::Dark,
            Self::Auto => appearance_from_colorfgbg(std::env::var("COLORFGBG").ok().as_deref()),
        }
    }
}

/// `COLORFGBG` is `fg;bg` (sometimes `fg;default;bg`); background colors
/// 0-6 and 8 are the dark half of the 16-color palette.
pub fn appearance_from_colorfgbg(value: Option<&str>) -> Appearance {
    let bg = value
        .and_then(|v| v.rsplit(';').next())
        .and_then(|bg| bg.trim().parse::<u8>().ok());
    match bg {
        Some(0..=6 | 8) => Appearance::Dark,
        _ => Appearance::Light,
    }
}

/// Per-invocation state, read once from the store and config.
#[derive(Debug, Clone)]
pub struct Session {
    pub logged_in: bool,
    pub theme: Theme,
    pub fields: FieldSet,
    pub default_sort: SortKey,
}

impl Session {
    #[tracing::instrument(skip(store, cfg))]
    pub fn load(store: &DataStore, cfg: &Config) -> anyhow::Result<Self> {
        let logged_in = store.get(LOGIN_KEY)?.as_deref().map(str::trim) == Some(LOGGED_IN_MARKER);

        let theme = match store.get(THEME_KEY)? {
            None => Theme::Auto,
            Some(raw) => raw.parse::<Theme>().unwrap_or_else(|err| {
                warn!(error = %err, "stored theme is invalid, using auto");
                Theme::Auto
            }),
        };

        let session = Self {
            logged_in,
            theme,
            fields: cfg.field_set()?,
            default_sort: cfg.default_sort()?,
        };
        debug!(logged_in, theme = %session.theme, "loaded session");
        Ok(session)
    }

    pub fn require_login(&self) -> anyhow::Result<()> {
        if self.logged_in {
            Ok(())
        } else {
            Err(anyhow!("not logged in; please log in with `todo login <user> <password>`"))
        }
    }
}

/// Only the fixed demo pair is accepted. Returns whether login succeeded.
#[tracing::instrument(skip(store, password))]
pub fn login(store: &DataStore, user: &str, password: &str) -> anyhow::Result<bool> {
    if user != LOGIN_USER || password != LOGIN_PASSWORD {
        info!("login rejected");
        return Ok(false);
    }
    store.set(LOGIN_KEY, LOGGED_IN_MARKER)?;
    info!("logged in");
    Ok(true)
}

#[tracing::instrument(skip(store))]
pub fn logout(store: &DataStore) -> anyhow::Result<()> {
    store.remove(LOGIN_KEY)?;
    info!("logged out");
    Ok(())
}

#[tracing::instrument(skip(store))]
pub fn save_theme(store: &DataStore, theme: Theme) -> anyhow::Result<()> {
    store.set(THEME_KEY, &theme.to_string())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::{Appearance, Session, Theme, appearance_from_colorfgbg, login, logout, save_theme};
    use crate::config::Config;
    use crate::datastore::{DataStore, THEME_KEY};

    #[test]
    fn login_accepts_only_fixed_pair() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        let cfg = Config::default();

        assert!(!Session::load(&store, &cfg).expect("load").logged_in);
        assert!(!login(&store, "user", "wrong").expect("login"));
        assert!(!Session::load(&store, &cfg).expect("load").logged_in);

        assert!(login(&store, "user", "pass").expect("login"));
        let session = Session::load(&store, &cfg).expect("load");
        assert!(session.logged_in);
        assert!(session.require_login().is_ok());

        logout(&store).expect("logout");
        let session = Session::load(&store, &cfg).expect("load");
        assert!(session.require_login().is_err());
    }

    #[test]
    fn theme_persists_and_invalid_reads_auto() {
        let temp = tempdir().expect("tempdir");
        let store = DataStore::open(temp.path()).expect("open");
        let cfg = Config::default();

        save_theme(&store, Theme::Dark).expect("save");
        assert_eq!(Session::load(&store, &cfg).expect("load").theme, Theme::Dark);

        store.set(THEME_KEY, "purple").expect("set");
        assert_eq!(Session::load(&store, &cfg).expect("load").theme, Theme::Auto);
    }

    #[test]
    fn colorfgbg_hint() {
        assert_eq!(appearance_from_colorfgbg(Some("15;0")), Appearance::Dark);
        assert_eq!(appearance_from_colorfgbg(Some("0;default;15")), Appearance::Light);
        assert_eq!(appearance_from_colorfgbg(Some("garbage")), Appearance::Light);
        assert_eq!(appearance_from_colorfgbg(None), Appearance::Light);
        assert_eq!(Theme::Dark.resolve(), Appearance::Dark);
    }
}
