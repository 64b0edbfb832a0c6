use std::collections::HashSet;
use std::ops::Range;
use std::path::PathBuf;

/// Source information for where a diagnostic came from
#[derive(Debug, Clone)]
pub struct SourceInfo {
    pub file_path: PathBuf,
    pub content: String,
}

/// A diagnostic message that can be either a warning or an error
#[derive(Debug, Clone)]
pub enum Diagnostic {
    Warning(Warning),
    Error(Error),
}

/// Warning messages that don't prevent config loading
#[derive(Debug, Clone)]
pub enum Warning {
    EmptyConfig { file_path: PathBuf },
}

/// Error messages that indicate problems with the config
#[derive(Debug, Clone)]
pub enum Error {
    Merge(MergeError),
    Validation(ValidationError),
}

/// Same field defined in more than one file
#[derive(Debug, Clone)]
pub struct MergeError {
    pub field_path: String,
    pub message: String,
    pub conflicts: Vec<FieldLocation>,
}

/// Where a field was defined
#[derive(Debug, Clone)]
pub struct FieldLocation {
    pub file_path: PathBuf,
    pub span: Range<usize>,
    pub content: String,
}

/// A field value that was parsed but is not acceptable
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field_path: String,
    pub message: String,
    /// Definition site, when the field was present in some file
    pub location: Option<FieldLocation>,
}

/// Config loading failures (parse errors, IO errors, etc.)
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read '{}': {error}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    #[error("Failed to parse '{}': {error}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        error: toml::de::Error,
    },

    #[error("Import cycle detected at '{}': involves {} file(s)", .path.display(), .cycle.len())]
    ImportCycle { path: PathBuf, cycle: Vec<PathBuf> },
}

impl Diagnostic {
    /// Returns true if this diagnostic is an error
    pub fn is_error(&self) -> bool {
        matches!(self, Diagnostic::Error(_))
    }

    /// Returns true if this diagnostic is a warning
    pub fn is_warning(&self) -> bool {
        matches!(self, Diagnostic::Warning(_))
    }
}

fn file_id(path: &std::path::Path) -> String {
    path.to_string_lossy().to_string()
}

fn write_merge_error(merge_error: &MergeError, output: &mut Vec<u8>) {
    use ariadne::Color;
    use ariadne::Label;
    use ariadne::Report;
    use ariadne::ReportKind;
    use ariadne::Source;

    let Some(first_conflict) = merge_error.conflicts.first() else {
        output.extend_from_slice(
            format!("Merge conflict in field '{}'\n", merge_error.field_path).as_bytes(),
        );
        return;
    };

    let mut report = Report::build(
        ReportKind::Error,
        (file_id(&first_conflict.file_path), first_conflict.span.clone()),
    )
    .with_message(format!(
        "Merge conflict in field '{}'",
        merge_error.field_path
    ))
    .with_note(&merge_error.message);

    for (idx, conflict) in merge_error.conflicts.iter().enumerate() {
        let label_msg = if idx == 0 {
            "first definition here"
        } else {
            "conflicts with this definition"
        };

        report = report.with_label(
            Label::new((file_id(&conflict.file_path), conflict.span.clone()))
                .with_message(label_msg)
                .with_color(if idx == 0 { Color::Red } else { Color::Yellow }),
        );
    }

    let finished_report = report.finish();

    // Each report is rendered once per distinct file it touches
    let mut written_files = HashSet::new();
    for conflict in &merge_error.conflicts {
        let id = file_id(&conflict.file_path);
        if written_files.insert(id.clone()) {
            let source = Source::from(&conflict.content);
            finished_report.write((id, source), &mut *output).ok();
        }
    }
}

fn write_validation_error(validation_error: &ValidationError, output: &mut Vec<u8>) {
    use ariadne::Color;
    use ariadne::Label;
    use ariadne::Report;
    use ariadne::ReportKind;
    use ariadne::Source;

    let Some(location) = &validation_error.location else {
        let error_msg = format!(
            "Validation error in '{}': {}\n",
            validation_error.field_path, validation_error.message
        );
        output.extend_from_slice(error_msg.as_bytes());
        return;
    };

    let id = file_id(&location.file_path);
    Report::build(ReportKind::Error, (id.clone(), location.span.clone()))
        .with_message(format!(
            "Validation error in '{}'",
            validation_error.field_path
        ))
        .with_label(
            Label::new((id.clone(), location.span.clone()))
                .with_message(&validation_error.message)
                .with_color(Color::Red),
        )
        .finish()
        .write((id, Source::from(&location.content)), &mut *output)
        .ok();
}

/// Format all diagnostics for display using Ariadne
pub fn format_diagnostics(diagnostics: &[Diagnostic]) -> String {
    let mut output = Vec::new();

    for diagnostic in diagnostics {
        match diagnostic {
            Diagnostic::Warning(Warning::EmptyConfig { file_path }) => {
                let warning_msg = format!(
                    "Warning: Config file '{}' is empty and has no effect\n",
                    file_path.display()
                );
                output.extend_from_slice(warning_msg.as_bytes());
            }
            Diagnostic::Error(Error::Merge(merge_error)) => {
                write_merge_error(merge_error, &mut output);
            }
            Diagnostic::Error(Error::Validation(validation_error)) => {
                write_validation_error(validation_error, &mut output);
            }
        }
    }

    String::from_utf8_lossy(&output).to_string()
}
