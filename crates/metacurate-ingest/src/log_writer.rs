//! JSON-lines writer for the action log: one serialised action per line, in
//! log order, so the downstream graph writer can stream it.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use metacurate_core::Action;

use crate::IngestError;

pub fn write_action_log<W: io::Write>(output: W, actions: &[Action]) -> Result<(), IngestError> {
    let mut writer = BufWriter::new(output);
    for action in actions {
        serde_json::to_writer(&mut writer, action)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_action_log_to_path(path: &Path, actions: &[Action]) -> Result<(), IngestError> {
    write_action_log(File::create(path)?, actions)?;
    tracing::info!(path = %path.display(), actions = actions.len(), "action log written");
    Ok(())
}
