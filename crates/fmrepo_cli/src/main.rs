//! CLI smoke entry point.
//!
//! # Responsibility
//! - Provide a minimal executable to verify `fmrepo_core` linkage.
//! - Optionally list the document ids matching a glob under a root.
//!
//! Usage: `fmrepo_cli [<root> <glob>]`. Set `FMREPO_LOG_DIR` to an absolute
//! directory to enable file logging.

use fmrepo_core::{default_log_level, init_logging, Direction, FmResult, Model, Repository};
use log::error;
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    if let Some(log_dir) = std::env::var_os("FMREPO_LOG_DIR") {
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("fmrepo logging disabled: {err}");
        }
    }

    println!("fmrepo_core version={}", fmrepo_core::core_version());

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [] => ExitCode::SUCCESS,
        [root, glob] => match list_ids(root, glob) {
            Ok(()) => ExitCode::SUCCESS,
            Err(err) => {
                error!("event=cli_list module=cli status=error error={}", err);
                eprintln!("error: {err}");
                ExitCode::FAILURE
            }
        },
        _ => {
            eprintln!("usage: fmrepo_cli [<root> <glob>]");
            ExitCode::from(2)
        }
    }
}

fn list_ids(root: &str, glob: &str) -> FmResult<()> {
    let repo = Arc::new(Repository::new(root)?);
    let model = Model::builder("document").scope(glob).bind(Arc::clone(&repo)).build();
    let ids = model.relation(repo).order("_id", Direction::Asc).ids()?;
    for id in &ids {
        println!("{id}");
    }
    println!("count={}", ids.len());
    Ok(())
}
