use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use toml::Spanned;

use super::diagnostics::Diagnostic;
use super::diagnostics::Error;
use super::diagnostics::FieldLocation;
use super::diagnostics::LoadError;
use super::diagnostics::MergeError;
use super::diagnostics::SourceInfo;
use super::diagnostics::Warning;
use super::LogLevel;
use crate::secret::ApiKey;

#[derive(Debug, Default, Deserialize)]
pub struct PartialConfig {
    #[serde(default)]
    pub imports: Vec<String>,

    pub logging: Option<PartialLoggingConfig>,
    pub weather: Option<PartialWeatherConfig>,
    pub api: Option<PartialApiConfig>,

    /// Source information for error reporting (not serialized)
    #[serde(skip)]
    pub source: Option<SourceInfo>,

    /// Definition site of every merged field, keyed by dotted path
    #[serde(skip)]
    pub origins: HashMap<String, FieldLocation>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialLoggingConfig {
    pub level: Option<Spanned<LogLevel>>,
    pub overrides: Option<HashMap<String, Spanned<LogLevel>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialWeatherConfig {
    pub name: Option<Spanned<String>>,
    pub api_key: Option<Spanned<ApiKey>>,
    pub update_interval_seconds: Option<Spanned<i64>>,
    pub location: Option<PartialLocation>,
}

/// Either the administrative-code fields or the coordinate fields
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialLocation {
    pub province: Option<Spanned<String>>,
    pub city: Option<Spanned<String>>,
    pub district: Option<Spanned<String>>,
    pub district_id: Option<Spanned<String>>,
    pub latitude: Option<Spanned<f64>>,
    pub longitude: Option<Spanned<f64>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartialApiConfig {
    pub enabled: Option<Spanned<bool>>,
    pub listen: Option<Spanned<String>>,
    pub port: Option<Spanned<u16>>,
}

/// First-wins field merging with conflict collection
struct Merger {
    origins: HashMap<String, FieldLocation>,
    diagnostics: Vec<Diagnostic>,
}

impl Merger {
    fn location(source: &SourceInfo, span: std::ops::Range<usize>) -> FieldLocation {
        FieldLocation {
            file_path: source.file_path.clone(),
            span,
            content: source.content.clone(),
        }
    }

    /// Keep `incoming` in `slot` unless the field was already defined; a second
    /// definition is recorded as a merge conflict.
    fn take<T>(
        &mut self,
        slot: &mut Option<Spanned<T>>,
        incoming: Option<Spanned<T>>,
        field_path: &str,
        source: &SourceInfo,
    ) {
        let Some(value) = incoming else {
            return;
        };
        let location = Self::location(source, value.span());

        if let Some(prev) = self.origins.get(field_path) {
            self.diagnostics.push(Diagnostic::Error(Error::Merge(MergeError {
                field_path: field_path.to_string(),
                message: format!("'{}' defined in multiple config files", field_path),
                conflicts: vec![prev.clone(), location],
            })));
        } else {
            *slot = Some(value);
            self.origins.insert(field_path.to_string(), location);
        }
    }
}

impl PartialConfig {
    /// Load a single config file without processing imports
    pub fn from_file(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
            path: path.to_path_buf(),
            error: e,
        })?;

        let mut config: PartialConfig =
            toml::from_str(&content).map_err(|e| LoadError::Parse {
                path: path.to_path_buf(),
                error: e,
            })?;

        config.source = Some(SourceInfo {
            file_path: path.to_path_buf(),
            content,
        });

        Ok(config)
    }

    /// Load config files with import resolution
    ///
    /// Returns all loaded configs in order (imports first, then parent)
    pub fn load_with_imports(paths: &[PathBuf]) -> Result<Vec<Self>, LoadError> {
        let mut visited = HashSet::new();
        let mut all_configs = Vec::new();

        for path in paths {
            Self::load_recursive(path, &mut visited, &mut all_configs)?;
        }

        Ok(all_configs)
    }

    fn load_recursive(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        configs: &mut Vec<Self>,
    ) -> Result<(), LoadError> {
        let canonical_path = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        if visited.contains(&canonical_path) {
            return Err(LoadError::ImportCycle {
                path: canonical_path.clone(),
                cycle: visited.iter().cloned().collect(),
            });
        }

        visited.insert(canonical_path.clone());

        let config = Self::from_file(path)?;

        // Relative imports resolve against the importing file's directory
        for import in &config.imports {
            let import_path = PathBuf::from(import);
            let resolved_path = if import_path.is_absolute() {
                import_path
            } else {
                let parent_dir = path.parent().unwrap_or_else(|| Path::new("."));
                parent_dir.join(import_path)
            };

            Self::load_recursive(&resolved_path, visited, configs)?;
        }

        configs.push(config);

        // Siblings may import the same file
        visited.remove(&canonical_path);

        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.logging.is_none()
            && self.weather.is_none()
            && self.api.is_none()
            && self.imports.is_empty()
    }

    /// Merge multiple partial configs together
    ///
    /// Uses first-wins semantics: the first occurrence of a field is kept. Every
    /// conflict is collected so all of them can be reported at once.
    ///
    /// Returns (merged, diagnostics) where diagnostics may contain warnings and errors
    pub fn merge<I>(configs: I) -> (Self, Vec<Diagnostic>)
    where
        I: IntoIterator<Item = Self>,
    {
        let mut result = PartialConfig::default();
        let mut merger = Merger {
            origins: HashMap::new(),
            diagnostics: Vec::new(),
        };
        let mut imports = Vec::new();

        for config in configs {
            imports.extend(config.imports.iter().cloned());

            let source = config.source.clone().unwrap_or_else(|| SourceInfo {
                file_path: PathBuf::from("<unknown>"),
                content: String::new(),
            });

            if config.is_empty() {
                merger
                    .diagnostics
                    .push(Diagnostic::Warning(Warning::EmptyConfig {
                        file_path: source.file_path.clone(),
                    }));
            }

            if let Some(logging) = config.logging {
                let into = result.logging.get_or_insert_with(Default::default);
                merger.take(&mut into.level, logging.level, "logging.level", &source);

                for (target, level) in logging.overrides.unwrap_or_default() {
                    let overrides = into.overrides.get_or_insert_with(HashMap::new);
                    let mut slot = overrides.remove(&target);
                    merger.take(
                        &mut slot,
                        Some(level),
                        &format!("logging.overrides.{}", target),
                        &source,
                    );
                    if let Some(level) = slot {
                        overrides.insert(target, level);
                    }
                }
            }

            if let Some(weather) = config.weather {
                let into = result.weather.get_or_insert_with(Default::default);
                merger.take(&mut into.name, weather.name, "weather.name", &source);
                merger.take(&mut into.api_key, weather.api_key, "weather.api_key", &source);
                merger.take(
                    &mut into.update_interval_seconds,
                    weather.update_interval_seconds,
                    "weather.update_interval_seconds",
                    &source,
                );

                if let Some(location) = weather.location {
                    let into = into.location.get_or_insert_with(Default::default);
                    merger.take(
                        &mut into.province,
                        location.province,
                        "weather.location.province",
                        &source,
                    );
                    merger.take(&mut into.city, location.city, "weather.location.city", &source);
                    merger.take(
                        &mut into.district,
                        location.district,
                        "weather.location.district",
                        &source,
                    );
                    merger.take(
                        &mut into.district_id,
                        location.district_id,
                        "weather.location.district_id",
                        &source,
                    );
                    merger.take(
                        &mut into.latitude,
                        location.latitude,
                        "weather.location.latitude",
                        &source,
                    );
                    merger.take(
                        &mut into.longitude,
                        location.longitude,
                        "weather.location.longitude",
                        &source,
                    );
                }
            }

            if let Some(api) = config.api {
                let into = result.api.get_or_insert_with(Default::default);
                merger.take(&mut into.enabled, api.enabled, "api.enabled", &source);
                merger.take(&mut into.listen, api.listen, "api.listen", &source);
                merger.take(&mut into.port, api.port, "api.port", &source);
            }
        }

        result.imports = imports;
        result.origins = merger.origins;

        (result, merger.diagnostics)
    }
}
