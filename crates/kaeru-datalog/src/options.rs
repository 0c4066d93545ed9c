//! Conversion settings shared by every stage of a run.

use serde::Serialize;

/// What to do when a data row cannot be converted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorMode {
    /// Skip the row, count it and keep going.
    #[default]
    Lenient,
    /// Abort the file on the first bad row.
    Strict,
}

/// How node properties are spread over relations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeLayout {
    /// One relation per node file holding the id and every scalar property.
    #[default]
    Row,
    /// One id relation plus one `(id, value)` relation per property.
    Column,
}

/// Soufflé type used for `:ID`, `:START_ID` and `:END_ID` columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdType {
    #[default]
    Number,
    Symbol,
}

/// Bit width of `number` in the Soufflé build that loads the facts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberWidth {
    /// Stock builds.
    #[default]
    Bits32,
    /// Builds configured with `-DSOUFFLE_DOMAIN_64BIT`.
    Bits64,
}

impl NumberWidth {
    pub fn bits(self) -> u32 {
        match self {
            NumberWidth::Bits32 => 32,
            NumberWidth::Bits64 => 64,
        }
    }
}

/// What to do with tab and line-break characters inside string values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TabPolicy {
    /// Replace each with a single space.
    #[default]
    Space,
    /// Drop them.
    Strip,
}

/// Which outputs a run produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EmitTarget {
    /// Declarations and facts.
    #[default]
    All,
    /// Only the `.dl` declaration file.
    Schema,
    /// Only the `.facts` files.
    Facts,
}

impl EmitTarget {
    pub fn schema(self) -> bool {
        matches!(self, EmitTarget::All | EmitTarget::Schema)
    }

    pub fn facts(self) -> bool {
        matches!(self, EmitTarget::All | EmitTarget::Facts)
    }
}

/// Settings for a conversion run.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertOptions {
    /// CSV field delimiter.
    pub delimiter: u8,
    /// CSV quote character.
    pub quote: u8,
    /// Separator between elements of array values.
    pub array_delimiter: char,
    /// Row failure policy.
    pub mode: ErrorMode,
    /// Node relation layout.
    pub layout: NodeLayout,
    /// Type of identifier columns.
    pub id_type: IdType,
    /// Range integers must fit. Larger values reject the row.
    pub number_width: NumberWidth,
    /// Cleaning policy for tabs and line breaks.
    pub tabs: TabPolicy,
    /// Symbol written for an empty string property.
    pub null_symbol: String,
    /// Outputs to produce.
    pub emit: EmitTarget,
    /// File name of the consolidated declaration file.
    pub declaration_file: String,
    /// Maximum number of input files processed at once.
    pub jobs: usize,
    /// Row errors kept per file in the run report.
    pub max_error_samples: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            quote: b'"',
            array_delimiter: ';',
            mode: ErrorMode::default(),
            layout: NodeLayout::default(),
            id_type: IdType::default(),
            number_width: NumberWidth::default(),
            tabs: TabPolicy::default(),
            null_symbol: "NULL".to_string(),
            emit: EmitTarget::default(),
            declaration_file: "schema.dl".to_string(),
            jobs: 1,
            max_error_samples: 20,
        }
    }
}

impl ConvertOptions {
    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_quote(mut self, quote: u8) -> Self {
        self.quote = quote;
        self
    }

    pub fn with_array_delimiter(mut self, delimiter: char) -> Self {
        self.array_delimiter = delimiter;
        self
    }

    pub fn with_mode(mut self, mode: ErrorMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_layout(mut self, layout: NodeLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_id_type(mut self, id_type: IdType) -> Self {
        self.id_type = id_type;
        self
    }

    pub fn with_number_width(mut self, width: NumberWidth) -> Self {
        self.number_width = width;
        self
    }

    pub fn with_tabs(mut self, tabs: TabPolicy) -> Self {
        self.tabs = tabs;
        self
    }

    pub fn with_null_symbol(mut self, null_symbol: impl Into<String>) -> Self {
        self.null_symbol = null_symbol.into();
        self
    }

    pub fn with_emit(mut self, emit: EmitTarget) -> Self {
        self.emit = emit;
        self
    }

    pub fn with_declaration_file(mut self, name: impl Into<String>) -> Self {
        self.declaration_file = name.into();
        self
    }

    /// Set the number of concurrent file jobs. Zero is treated as one.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    pub fn with_max_error_samples(mut self, max: usize) -> Self {
        self.max_error_samples = max;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.mode == ErrorMode::Strict
    }
}
