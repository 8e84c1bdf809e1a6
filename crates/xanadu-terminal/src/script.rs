//! Script files: one command line per line, run as a batch.

use std::path::Path;

use xanadu_types::error::Result;

use crate::context::ExecutionContext;
use crate::runner::{Outcome, Site, run_lines};

/// Run every line of `text` as a script.
pub fn run_script_text(ctx: &mut ExecutionContext, text: &str) -> Outcome {
    run_lines(ctx, text.lines(), Site::Script)
}

/// Read and run a script file.
pub fn run_script(ctx: &mut ExecutionContext, path: &Path) -> Result<Outcome> {
    let text = std::fs::read_to_string(path)?;
    log::info!("Running script {}", path.display());
    let outcome = run_script_text(ctx, &text);
    log::debug!("Script {} finished: {outcome:?}", path.display());
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::tests::make_ctx;

    #[test]
    fn runs_multi_line_statement() {
        let (mut ctx, buf) = make_ctx();
        let outcome = run_script_text(&mut ctx, "echo start\nselect a\nfrom b;\necho end\n");
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(buf.contents(), "start\nexec: select a\nfrom b;\nend\n");
    }

    #[test]
    fn missing_file_is_io_error() {
        let (mut ctx, _buf) = make_ctx();
        let err = run_script(&mut ctx, Path::new("/definitely/not/here.xan")).unwrap_err();
        assert!(matches!(err, xanadu_types::error::XanaduError::Io(_)));
    }

    #[test]
    fn reads_file_from_disk() {
        let (mut ctx, buf) = make_ctx();
        let path = std::env::temp_dir().join(format!("xanadu-script-{}.xan", std::process::id()));
        std::fs::write(&path, "echo from file\n").unwrap();
        let outcome = run_script(&mut ctx, &path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(outcome, Outcome::Done);
        assert_eq!(buf.contents(), "from file\n");
    }
}
