//! Render the consolidated Soufflé declaration file.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::ConvertError;
use crate::mapper::MappingTable;

/// Renders `.decl` and `.input` statements for every mapped relation.
pub struct DeclarationWriter;

impl DeclarationWriter {
    /// Render the declaration file for a run.
    ///
    /// Relations are grouped per input file, in input order, under a
    /// `// <kind>s: <file name>` comment. Each `.decl` is followed by its
    /// `.input` directive.
    pub fn render(table: &MappingTable) -> String {
        let mut output = String::new();

        for (i, entity) in table.entities.iter().enumerate() {
            if i > 0 {
                output.push('\n');
            }
            output.push_str(&format!(
                "// {}s: {}\n",
                entity.schema.kind,
                entity.schema.display_name()
            ));
            for relation in entity.relations() {
                output.push_str(&relation.declaration());
                output.push('\n');
                output.push_str(&relation.input_directive());
                output.push('\n');
            }
        }

        output
    }

    /// Write the declaration file into `output_dir`, replacing any previous
    /// version atomically.
    pub fn write(
        table: &MappingTable,
        output_dir: &Path,
        file_name: &str,
    ) -> Result<PathBuf, ConvertError> {
        let path = output_dir.join(file_name);
        let mut temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", file_name))
            .suffix(".tmp")
            .tempfile_in(output_dir)
            .map_err(|e| ConvertError::io(output_dir, e))?;

        temp.write_all(Self::render(table).as_bytes())
            .map_err(|e| ConvertError::io(&path, e))?;
        temp.persist(&path).map_err(|e| ConvertError::io(&path, e.error))?;

        info!(
            path = %path.display(),
            relations = table.relations().count(),
            "wrote declarations"
        );
        Ok(path)
    }
}
