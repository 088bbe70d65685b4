use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use once_cell::sync::Lazy;
use serde::Deserialize;

const EN: &str = include_str!("../lang/en.yaml");
const RU: &str = include_str!("../lang/ru.yaml");

static BUILTIN_EN: Lazy<Arc<Lang>> = Lazy::new(|| {
    Arc::new(Lang::from_yaml_str(EN).unwrap_or_else(|err| {
        tracing::error!("Failed to parse built-in language pack 'en': {err:?}");
        Lang::fallback()
    }))
});

static BUILTIN_RU: Lazy<Arc<Lang>> = Lazy::new(|| {
    Arc::new(Lang::from_yaml_str(RU).unwrap_or_else(|err| {
        tracing::error!("Failed to parse built-in language pack 'ru': {err:?}");
        Lang::fallback()
    }))
});

/// How a count selects one of a unit's plural forms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PluralRule {
    /// `[one, other]`
    #[default]
    English,
    /// `[one, few, many]`, as used by Russian and Ukrainian.
    Slavic,
}

impl PluralRule {
    pub fn form(&self, n: u64) -> usize {
        match self {
            PluralRule::English => usize::from(n != 1),
            PluralRule::Slavic => {
                let (rem10, rem100) = (n % 10, n % 100);
                if rem10 == 1 && rem100 != 11 {
                    0
                } else if (2..=4).contains(&rem10) && !(10..20).contains(&rem100) {
                    1
                } else {
                    2
                }
            }
        }
    }
}

#[derive(Deserialize)]
struct RawLang {
    #[serde(default)]
    rule: PluralRule,
    #[serde(default)]
    common: HashMap<String, String>,
    #[serde(default)]
    plurals: HashMap<String, Vec<String>>,
    months: Vec<String>,
    days: Vec<String>,
}

/// A language pack: translated strings, plural forms and calendar names.
#[derive(Debug, Clone)]
pub struct Lang {
    rule: PluralRule,
    common: HashMap<String, String>,
    plurals: HashMap<String, Vec<String>>,
    months: Vec<String>,
    days: Vec<String>,
}

impl Lang {
    pub fn builtin(code: &str) -> Result<Arc<Lang>> {
        match code {
            "en" => Ok(BUILTIN_EN.clone()),
            "ru" => Ok(BUILTIN_RU.clone()),
            other => Err(anyhow!("lang: no built-in language pack {other:?}")),
        }
    }

    pub fn english() -> Arc<Lang> {
        BUILTIN_EN.clone()
    }

    pub fn load(path: &Path) -> Result<Lang> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("lang: read {}", path.display()))?;
        Self::from_yaml_str(&data).with_context(|| format!("lang: parse {}", path.display()))
    }

    pub fn from_yaml_str(data: &str) -> Result<Lang> {
        let raw: RawLang = serde_yaml::from_str(data).context("lang: decode yaml")?;
        ensure!(raw.months.len() == 12, "lang: expected 12 month names, got {}", raw.months.len());
        ensure!(raw.days.len() == 7, "lang: expected 7 day names, got {}", raw.days.len());
        Ok(Lang {
            rule: raw.rule,
            common: raw.common,
            plurals: raw.plurals,
            months: raw.months,
            days: raw.days,
        })
    }

    fn fallback() -> Lang {
        let names = |n: usize, prefix: &str| (1..=n).map(|i| format!("{prefix}{i}")).collect();
        Lang {
            rule: PluralRule::English,
            common: HashMap::new(),
            plurals: HashMap::new(),
            months: names(12, "M"),
            days: names(7, "D"),
        }
    }

    /// Translates `key`, returning the key itself when it has no entry.
    pub fn tr<'a>(&'a self, key: &'a str) -> &'a str {
        self.common.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Picks the plural form of `key` for `n`.
    pub fn ngettext<'a>(&'a self, key: &'a str, n: u64) -> &'a str {
        let Some(forms) = self.plurals.get(key) else {
            return key;
        };
        let idx = self.rule.form(n);
        forms
            .get(idx)
            .or_else(|| forms.last())
            .map(String::as_str)
            .unwrap_or(key)
    }

    /// Month name for a zero-based month index.
    pub fn month(&self, month0: u32) -> &str {
        &self.months[month0 as usize % 12]
    }

    /// Day name for a zero-based weekday index, Sunday first.
    pub fn day(&self, weekday0: u32) -> &str {
        &self.days[weekday0 as usize % 7]
    }
}
