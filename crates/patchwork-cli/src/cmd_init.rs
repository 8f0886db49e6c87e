use patchwork_ledger::WorkspacePaths;
use std::path::Path;

pub fn execute(repo_root: &Path) -> anyhow::Result<()> {
    let paths = WorkspacePaths::discover(repo_root);
    if paths.is_initialized() {
        // Repair a partially created layout.
        paths.ensure_layout()?;
        println!("Already initialized at {}", paths.patchwork_dir.display());
        return Ok(());
    }
    paths.ensure_layout()?;
    println!("Initialized patchwork workspace at {}", paths.patchwork_dir.display());
    println!("  create a document with `patchwork new`");
    Ok(())
}
