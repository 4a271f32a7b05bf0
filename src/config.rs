//! Packager configuration.
//!
//! Values are read from an optional TOML file; every key is optional and falls back to the
//! defaults below. None of the options can affect the page-number invariants of a package, only
//! how it is rendered and how folders are discovered.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::fonts;

/// Paper size of generated TOC pages, in PDF points.
#[derive(Clone, Copy, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageSize {
    /// ISO A4 portrait.
    #[default]
    A4,
    /// US Letter portrait.
    Letter,
    /// Any other size.
    Custom {
        /// Page width in points.
        width: f32,
        /// Page height in points.
        height: f32,
    },
}

impl PageSize {
    /// Returns `(width, height)` in points.
    pub fn dimensions(self) -> (f32, f32) {
        match self {
            Self::A4 => (595.0, 842.0),
            Self::Letter => (612.0, 792.0),
            Self::Custom { width, height } => (width, height),
        }
    }
}

/// How a TOC entry wider than the text column is rendered.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TocOverflow {
    /// Cut the text and append an ellipsis; every entry occupies one line.
    #[default]
    Truncate,
    /// Wrap the text over as many lines as needed.
    Wrap,
}

/// Margins of generated TOC pages, in points.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageMargins {
    /// Left margin.
    pub left: f32,
    /// Right margin.
    pub right: f32,
    /// Top margin.
    pub top: f32,
    /// Bottom margin.
    pub bottom: f32,
}

impl Default for PageMargins {
    fn default() -> Self {
        Self {
            left: 50.0,
            right: 60.0,
            top: 50.0,
            bottom: 50.0,
        }
    }
}

/// All recognised packager options.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct PackagerConfig {
    /// Number of TOC lines per page; derived from the page geometry when unset.
    pub lines_per_page: Option<usize>,
    /// Heading printed on the first TOC page.
    pub toc_title: String,
    /// Character repeated between an entry and its page number.
    pub dot_leader_char: char,
    /// Paper size of TOC pages.
    pub page_size: PageSize,
    /// Margins of TOC pages.
    pub margins: PageMargins,
    /// Font size of TOC entries in points.
    pub font_size: f32,
    /// Treatment of entries wider than the text column.
    pub toc_overflow: TocOverflow,
    /// Whether to generate TOC pages at all.
    pub toc_enabled: bool,
    /// Whether a run with skipped items still writes a package.
    pub accept_partial: bool,
    /// Whether folder discovery descends into sub-folders.
    pub recursive: bool,
    /// Whether the first scan sorts items by Table/Listing/Figure/Appendix number.
    pub sort_on_discovery: bool,
    /// Poll interval of the folder watcher.
    pub auto_refresh_interval_seconds: u64,
    /// Upper bound for a single document conversion.
    pub conversion_timeout_seconds: u64,
    /// Office suite executable used for RTF/DOCX conversion.
    pub converter_program: String,
}

impl Default for PackagerConfig {
    fn default() -> Self {
        Self {
            lines_per_page: None,
            toc_title: "Table of Contents".to_string(),
            dot_leader_char: '.',
            page_size: PageSize::default(),
            margins: PageMargins::default(),
            font_size: 8.0,
            toc_overflow: TocOverflow::default(),
            toc_enabled: true,
            accept_partial: true,
            recursive: false,
            sort_on_discovery: true,
            auto_refresh_interval_seconds: 3,
            conversion_timeout_seconds: 120,
            converter_program: "soffice".to_string(),
        }
    }
}

impl PackagerConfig {
    /// Loads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|err| match err {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: Default::default(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every value is usable for rendering and discovery.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.font_size > 0.0) {
            return Err(ConfigError::Invalid {
                key: "font_size",
                message: format!("must be positive, got {}", self.font_size),
            });
        }
        if self.lines_per_page == Some(0) {
            return Err(ConfigError::Invalid {
                key: "lines_per_page",
                message: "must be at least 1".to_string(),
            });
        }
        let (width, height) = self.page_size.dimensions();
        if !(width > 0.0 && height > 0.0) {
            return Err(ConfigError::Invalid {
                key: "page_size",
                message: format!("dimensions must be positive, got {width}x{height}"),
            });
        }
        if self.margins.left + self.margins.right >= width
            || self.margins.top + self.margins.bottom >= height
        {
            return Err(ConfigError::Invalid {
                key: "margins",
                message: "margins leave no printable area".to_string(),
            });
        }
        if self.dot_leader_char.is_whitespace() || fonts::encode_char(self.dot_leader_char).is_none()
        {
            return Err(ConfigError::Invalid {
                key: "dot_leader_char",
                message: format!("{:?} cannot be printed with the TOC font", self.dot_leader_char),
            });
        }
        if self.auto_refresh_interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "auto_refresh_interval_seconds",
                message: "must be at least 1".to_string(),
            });
        }
        if self.conversion_timeout_seconds == 0 {
            return Err(ConfigError::Invalid {
                key: "conversion_timeout_seconds",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Poll interval of the folder watcher.
    pub fn auto_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.auto_refresh_interval_seconds)
    }

    /// Upper bound for a single conversion.
    pub fn conversion_timeout(&self) -> Duration {
        Duration::from_secs(self.conversion_timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::{PackagerConfig, PageSize, TocOverflow};
    use crate::error::ConfigError;

    #[test]
    fn empty_file_yields_defaults() {
        let config = PackagerConfig::from_toml("").expect("parse empty config");
        assert_eq!(config, PackagerConfig::default());
    }

    #[test]
    fn parses_recognised_options() {
        let config = PackagerConfig::from_toml(
            r#"
            lines_per_page = 20
            toc_title = "Contents"
            dot_leader_char = "-"
            page_size = "letter"
            toc_overflow = "wrap"
            auto_refresh_interval_seconds = 10
            "#,
        )
        .expect("parse config");

        assert_eq!(config.lines_per_page, Some(20));
        assert_eq!(config.toc_title, "Contents");
        assert_eq!(config.dot_leader_char, '-');
        assert_eq!(config.page_size, PageSize::Letter);
        assert_eq!(config.toc_overflow, TocOverflow::Wrap);
        assert_eq!(config.auto_refresh_interval_seconds, 10);
    }

    #[test]
    fn parses_custom_page_size() {
        let config =
            PackagerConfig::from_toml("page_size = { custom = { width = 500.0, height = 700.0 } }")
                .expect("parse config");
        assert_eq!(config.page_size.dimensions(), (500.0, 700.0));
    }

    #[test]
    fn rejects_zero_lines_per_page() {
        let err = PackagerConfig::from_toml("lines_per_page = 0").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "lines_per_page",
                ..
            }
        ));
    }

    #[test]
    fn rejects_unprintable_leader() {
        let err = PackagerConfig::from_toml("dot_leader_char = \"\u{4e00}\"").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                key: "dot_leader_char",
                ..
            }
        ));
    }
}
