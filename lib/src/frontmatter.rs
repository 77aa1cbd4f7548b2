//! Front matter: the metadata block at the start of a content file.
//!
//! Two fences are recognized: `+++` for TOML and `---` for YAML. The block is
//! decoded into the typed [`FrontMatter`]; keys it doesn't know are kept in
//! [`FrontMatter::extra`].

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::error::{Chainable, ErrorDetail, ErrorKind, Result};

pub type Dict = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub summary: Option<String>,
    #[serde(with = "date_time")]
    pub date: Option<NaiveDateTime>,
    #[serde(with = "date")]
    pub lastmod: Option<NaiveDate>,
    pub draft: bool,
    pub tags: Vec<String>,
    /// `name` or `name#entry`.
    pub template: Option<String>,
    #[serde(rename = "templateParams", alias = "template_params")]
    pub template_params: Dict,
    /// Glob overrides for the site-wide asset patterns.
    pub assets: Option<Vec<String>>,
    pub layout: Option<String>,
    /// Fixed parameter values for a parametric file.
    pub params: Option<Vec<String>>,
    /// Front matter key whose values across the site become the parameter
    /// values for a parametric file.
    pub taxonomy: Option<String>,
    #[serde(flatten)]
    pub extra: Dict,
}

pub trait Format {
    /// The line opening and closing a block in this format.
    const FENCE: &'static str;

    type Error: ErrorDetail + 'static;

    fn from_str<T: DeserializeOwned>(string: &str) -> Result<T, Self::Error>;
}

pub struct Toml;

pub struct Yaml;

impl Format for Toml {
    const FENCE: &'static str = "+++";

    type Error = toml::de::Error;

    fn from_str<T: DeserializeOwned>(string: &str) -> Result<T, Self::Error> {
        toml::from_str(string)
    }
}

impl Format for Yaml {
    const FENCE: &'static str = "---";

    type Error = serde_yaml::Error;

    fn from_str<T: DeserializeOwned>(string: &str) -> Result<T, Self::Error> {
        serde_yaml::from_str(string)
    }
}

impl FrontMatter {
    /// Parses the front matter at the start of `input`.
    ///
    /// Returns the decoded front matter and the length in bytes of the block,
    /// fences included. The body starts at that offset. Input without a
    /// recognized opening fence has empty front matter of length `0`.
    pub fn parse(input: &str) -> Result<(FrontMatter, usize)> {
        if let Some((block, rest)) = split(input, Toml::FENCE) {
            let matter = decode::<Toml>(block)?;
            return Ok((matter, input.len() - rest.len()));
        }

        if let Some((block, rest)) = split(input, Yaml::FENCE) {
            let matter = decode::<Yaml>(block)?;
            return Ok((matter, input.len() - rest.len()));
        }

        Ok((FrontMatter::default(), 0))
    }

    /// The string values stored under `key`: `tags`, or a string or list of
    /// strings in `extra`.
    pub fn values_of(&self, key: &str) -> Vec<String> {
        if key == "tags" {
            return self.tags.clone();
        }

        match self.extra.get(key) {
            Some(serde_json::Value::String(s)) => vec![s.clone()],
            Some(serde_json::Value::Array(values)) => values.iter()
                .filter_map(|v| v.as_str())
                .map(String::from)
                .collect(),
            _ => vec![],
        }
    }
}

fn decode<F: Format>(block: &str) -> Result<FrontMatter> {
    if block.trim().is_empty() {
        return Ok(FrontMatter::default());
    }

    F::from_str::<FrontMatter>(block)
        .chain(error!("invalid front matter"))
        .kind(ErrorKind::Parse)
}

/// Splits `input` into the text between a leading `fence` line and the next
/// `fence` line, and everything after that closing line.
fn split<'a>(input: &'a str, fence: &str) -> Option<(&'a str, &'a str)> {
    let rest = input.strip_prefix(fence)?;
    let rest = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n'))?;

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end_matches(['\r', '\n']) == fence {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }

        offset += line.len();
    }

    None
}

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%I:%M:%S%p",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Parses a `date` value: `YYYY-M-DTHH:MM:SSPM`, ISO date-times, or a bare
/// date at midnight.
pub fn parse_date_time(string: &str) -> Option<NaiveDateTime> {
    let string = string.trim();
    DATE_TIME_FORMATS.iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(string, fmt).ok())
        .or_else(|| parse_date(string).and_then(|d| d.and_hms_opt(0, 0, 0)))
}

/// Parses a `lastmod` value: `YYYY-M-D`.
pub fn parse_date(string: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(string.trim(), DATE_FORMAT).ok()
}

/// Extracts the string form of a date, which is either a plain string or a
/// TOML datetime (deserialized as a single-key table).
fn date_string(value: serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Object(map) => map.get("$__toml_private_datetime")
            .and_then(|v| v.as_str())
            .map(String::from),
        _ => None,
    }
}

mod date_time {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<NaiveDateTime>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(dt) => s.serialize_str(&dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<NaiveDateTime>, D::Error> {
        let value = serde_json::Value::deserialize(de)?;
        if value.is_null() {
            return Ok(None);
        }

        let string = super::date_string(value)
            .ok_or_else(|| de::Error::custom("`date` must be a string"))?;

        super::parse_date_time(&string)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid `date`: {string}")))
    }
}

mod date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<NaiveDate>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(d) => s.serialize_str(&d.format(super::DATE_FORMAT).to_string()),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<NaiveDate>, D::Error> {
        let value = serde_json::Value::deserialize(de)?;
        if value.is_null() {
            return Ok(None);
        }

        let string = super::date_string(value)
            .ok_or_else(|| de::Error::custom("`lastmod` must be a string"))?;

        super::parse_date(&string)
            .or_else(|| super::parse_date_time(&string).map(|dt| dt.date()))
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("invalid `lastmod`: {string}")))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike, Timelike};

    use super::*;

    #[test]
    fn toml_block() {
        let input = "+++\ntitle = \"Hello\"\ndraft = true\ntags = [\"go\", \"rust\"]\n+++\nbody\n";
        let (matter, len) = FrontMatter::parse(input).unwrap();
        assert_eq!(matter.title.as_deref(), Some("Hello"));
        assert!(matter.draft);
        assert_eq!(matter.tags, ["go", "rust"]);
        assert_eq!(&input[len..], "body\n");
    }

    #[test]
    fn yaml_block_with_dates_and_extras() {
        let input = "---\ntitle: Post\ndate: 2023-1-2T03:04:05PM\nlastmod: 2023-2-3\nauthor: someone\nassets: ['*.dat']\n---\n# Heading\n";
        let (matter, len) = FrontMatter::parse(input).unwrap();
        let date = matter.date.unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2023, 1, 2));
        assert_eq!((date.hour(), date.minute(), date.second()), (15, 4, 5));
        assert_eq!(matter.lastmod.unwrap().month(), 2);
        assert_eq!(matter.extra["author"], "someone");
        assert_eq!(matter.assets.unwrap(), ["*.dat"]);
        assert_eq!(&input[len..], "# Heading\n");
    }

    #[test]
    fn no_block() {
        let (matter, len) = FrontMatter::parse("# Just markdown\n---\n").unwrap();
        assert_eq!(matter, FrontMatter::default());
        assert_eq!(len, 0);

        let (_, len) = FrontMatter::parse("+++\nunterminated = 1\n").unwrap();
        assert_eq!(len, 0);
    }

    #[test]
    fn empty_block() {
        let input = "---\n---\nbody";
        let (matter, len) = FrontMatter::parse(input).unwrap();
        assert_eq!(matter, FrontMatter::default());
        assert_eq!(&input[len..], "body");
    }

    #[test]
    fn type_mismatch_is_a_parse_error() {
        let error = FrontMatter::parse("+++\ndraft = \"yes\"\n+++\n").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Parse);

        let error = FrontMatter::parse("---\ndate: not a date\n---\n").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Parse);
    }

    #[test]
    fn values_of_extra_keys() {
        let (matter, _) = FrontMatter::parse("+++\ntags = [\"a\"]\nseries = \"intro\"\nauthors = [\"x\", \"y\"]\n+++\n").unwrap();
        assert_eq!(matter.values_of("tags"), ["a"]);
        assert_eq!(matter.values_of("series"), ["intro"]);
        assert_eq!(matter.values_of("authors"), ["x", "y"]);
        assert!(matter.values_of("missing").is_empty());
    }
}
