//! Command-line arguments shared by every subcommand.

use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};
use kaeru_datalog::{
    ConvertOptions, EmitTarget, EntityKind, ErrorMode, IdType, InputFile, NodeLayout, NumberWidth,
    TabPolicy,
};

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
pub fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

/// Parse a single-byte CSV delimiter or quote character.
///
/// Accepts one ASCII character, or `\t` / `tab` for a tab.
pub fn parse_byte(s: &str) -> Result<u8, String> {
    match s {
        "\\t" | "tab" | "TAB" => return Ok(b'\t'),
        _ => {}
    }
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c as u8),
        _ => Err(format!(
            "invalid delimiter '{}', expected a single ASCII character",
            s
        )),
    }
}

/// Parse an import input of the form `[LABEL=]FILE`.
///
/// Only an `=` before the first path separator starts a label, so file
/// names containing `=` still work.
pub fn parse_labeled_path(s: &str) -> Result<LabeledPath, String> {
    if s.is_empty() {
        return Err("empty input file".to_string());
    }
    if let Some((label, path)) = s.split_once('=')
        && !label.contains(['/', '\\'])
    {
        if label.is_empty() || path.is_empty() {
            return Err(format!("invalid input '{}', expected LABEL=FILE", s));
        }
        return Ok(LabeledPath {
            label: Some(label.to_string()),
            path: PathBuf::from(path),
        });
    }
    Ok(LabeledPath {
        label: None,
        path: PathBuf::from(s),
    })
}

/// An input file with an optional fixed label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledPath {
    pub label: Option<String>,
    pub path: PathBuf,
}

impl LabeledPath {
    pub fn into_input(self, kind: EntityKind, dir: &Path) -> InputFile {
        InputFile {
            path: dir.join(self.path),
            kind,
            label: self.label,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmitArg {
    /// Declarations and facts
    All,
    /// Facts only
    Fact,
    /// Declarations only
    Schema,
}

impl From<EmitArg> for EmitTarget {
    fn from(arg: EmitArg) -> Self {
        match arg {
            EmitArg::All => EmitTarget::All,
            EmitArg::Fact => EmitTarget::Facts,
            EmitArg::Schema => EmitTarget::Schema,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutArg {
    /// One relation per node file
    Row,
    /// One relation per property
    Col,
}

impl From<LayoutArg> for NodeLayout {
    fn from(arg: LayoutArg) -> Self {
        match arg {
            LayoutArg::Row => NodeLayout::Row,
            LayoutArg::Col => NodeLayout::Column,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IdTypeArg {
    Number,
    Symbol,
}

impl From<IdTypeArg> for IdType {
    fn from(arg: IdTypeArg) -> Self {
        match arg {
            IdTypeArg::Number => IdType::Number,
            IdTypeArg::Symbol => IdType::Symbol,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NumberWidthArg {
    /// Stock Soufflé builds
    #[value(name = "32")]
    Bits32,
    /// Soufflé built with 64-bit domains
    #[value(name = "64")]
    Bits64,
}

impl From<NumberWidthArg> for NumberWidth {
    fn from(arg: NumberWidthArg) -> Self {
        match arg {
            NumberWidthArg::Bits32 => NumberWidth::Bits32,
            NumberWidthArg::Bits64 => NumberWidth::Bits64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TabsArg {
    /// Replace tabs and line breaks with a space
    Space,
    /// Remove tabs and line breaks
    Strip,
}

impl From<TabsArg> for TabPolicy {
    fn from(arg: TabsArg) -> Self {
        match arg {
            TabsArg::Space => TabPolicy::Space,
            TabsArg::Strip => TabPolicy::Strip,
        }
    }
}

/// Where inputs are read from and what is written.
#[derive(Debug, Args)]
pub struct OutputArgs {
    /// Directory input file paths are relative to
    #[arg(short = 'd', long = "dir", env = "KAERU_INPUT_DIR", default_value = ".")]
    pub input_dir: PathBuf,

    /// Output directory for declaration and fact files
    #[arg(short = 'o', long = "out", env = "KAERU_OUTPUT_DIR", default_value = ".")]
    pub output_dir: PathBuf,

    /// Which outputs to write
    #[arg(short = 't', long = "target", env = "KAERU_TARGET", value_enum, default_value_t = EmitArg::All)]
    pub target: EmitArg,
}

/// Conversion settings.
#[derive(Debug, Args)]
pub struct SharedArgs {
    /// Abort on the first row that cannot be converted
    #[arg(
        long,
        env = "KAERU_STRICT",
        value_parser = parse_bool_env,
        default_value = "false",
        default_missing_value = "true",
        num_args = 0..=1
    )]
    pub strict: bool,

    /// CSV field delimiter
    #[arg(long, env = "KAERU_DELIMITER", value_parser = parse_byte, default_value = ",")]
    pub delimiter: u8,

    /// Separator between array elements
    #[arg(long, env = "KAERU_ARRAY_DELIMITER", default_value_t = ';')]
    pub array_delimiter: char,

    /// CSV quote character
    #[arg(long, env = "KAERU_QUOTE", value_parser = parse_byte, default_value = "\"")]
    pub quote: u8,

    /// Soufflé type of identifier columns
    #[arg(long, env = "KAERU_ID_TYPE", value_enum, default_value_t = IdTypeArg::Number)]
    pub id_type: IdTypeArg,

    /// Bit width of Soufflé's number type; larger integers reject the row
    #[arg(long, env = "KAERU_NUMBER_WIDTH", value_enum, default_value_t = NumberWidthArg::Bits32)]
    pub number_width: NumberWidthArg,

    /// What to do with tabs and line breaks inside strings
    #[arg(long, env = "KAERU_TABS", value_enum, default_value_t = TabsArg::Space)]
    pub tabs: TabsArg,

    /// Symbol written for empty string values
    #[arg(long, env = "KAERU_NULL_SYMBOL", default_value = "NULL")]
    pub null_symbol: String,

    /// Number of files converted concurrently
    #[arg(long, env = "KAERU_JOBS", default_value_t = 1)]
    pub jobs: usize,

    /// Row errors kept per file in the report
    #[arg(long, env = "KAERU_MAX_ERRORS", default_value_t = 20)]
    pub max_errors: usize,

    /// File name of the declaration file
    #[arg(long, env = "KAERU_DECL_FILE")]
    pub decl_file: Option<String>,

    /// Write a JSON run report to this path
    #[arg(long, env = "KAERU_REPORT")]
    pub report: Option<PathBuf>,
}

impl SharedArgs {
    /// Build conversion options. `default_decl` is used when no declaration
    /// file name was given.
    pub fn options(&self, output: &OutputArgs, layout: LayoutArg, default_decl: &str) -> ConvertOptions {
        let mode = if self.strict {
            ErrorMode::Strict
        } else {
            ErrorMode::Lenient
        };

        ConvertOptions::default()
            .with_delimiter(self.delimiter)
            .with_quote(self.quote)
            .with_array_delimiter(self.array_delimiter)
            .with_mode(mode)
            .with_layout(layout.into())
            .with_id_type(self.id_type.into())
            .with_number_width(self.number_width.into())
            .with_tabs(self.tabs.into())
            .with_null_symbol(self.null_symbol.clone())
            .with_emit(output.target.into())
            .with_declaration_file(self.decl_file.as_deref().unwrap_or(default_decl))
            .with_jobs(self.jobs)
            .with_max_error_samples(self.max_errors)
    }
}

/// Declaration file name for a single-file run: the input's stem plus `.dl`.
pub fn declaration_name(file: &Path) -> String {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "schema".to_string());
    format!("{}.dl", stem)
}
