//! embin - Package files into a single self-contained executable
//!
//! This tool appends an archive of files and an entry point to a copy of a
//! runtime executable, and inspects archives produced that way.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use embin_core::{Archive, Packager, PackagerConfig, ReadableTree};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::EnvFilter;

/// Package files into a single self-contained executable
#[derive(Parser, Debug)]
#[command(name = "embin")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build an executable from a runtime and a set of files
    Build(BuildArgs),
    /// List a directory inside an archive
    Ls(LsArgs),
    /// Print an embedded file to stdout
    Cat(CatArgs),
    /// Show the footer and entry point of an archive
    Info(InfoArgs),
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Runtime executable to append the archive to
    #[arg(short, long, env = "EMBIN_RUNTIME")]
    runtime: PathBuf,

    /// Archive path of the entry file (e.g. /app/main.js)
    #[arg(short, long)]
    entry: String,

    /// Output executable
    #[arg(short, long)]
    output: PathBuf,

    /// Files or glob patterns to embed at their own paths
    files: Vec<String>,

    /// Module directories to embed under the modules root
    #[arg(short, long = "module")]
    modules: Vec<PathBuf>,

    /// Archive directory modules are placed under
    #[arg(long, default_value = "/node_modules")]
    modules_root: String,

    /// Do not mark the output as executable
    #[arg(long)]
    no_exec: bool,
}

#[derive(Args, Debug)]
struct LsArgs {
    /// Packaged executable
    archive: PathBuf,

    /// Directory inside the archive
    #[arg(default_value = "/")]
    path: String,

    /// List every file below the directory
    #[arg(short, long)]
    recursive: bool,
}

#[derive(Args, Debug)]
struct CatArgs {
    /// Packaged executable
    archive: PathBuf,

    /// File inside the archive
    path: String,
}

#[derive(Args, Debug)]
struct InfoArgs {
    /// Packaged executable
    archive: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .init();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Command::Build(args) => build(&args, &mut out),
        Command::Ls(args) => list(&args, &mut out),
        Command::Cat(args) => cat(&args, &mut out),
        Command::Info(args) => show_info(&args, &mut out),
    }
}

/// Compute a short hash of the content (first 8 chars of blake3)
fn content_hash(content: impl Read) -> io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(content)?;
    Ok(hasher.finalize().to_hex()[..8].to_string())
}

fn open_archive(path: &Path) -> Result<Archive> {
    Archive::open(path).with_context(|| format!("Failed to load archive: {}", path.display()))
}

fn build(args: &BuildArgs, out: &mut dyn Write) -> Result<()> {
    if args.files.is_empty() && args.modules.is_empty() {
        bail!("Nothing to package: pass files, glob patterns or --module directories");
    }

    let config = PackagerConfig::new(&args.runtime, args.entry.clone())
        .modules_root(args.modules_root.clone())
        .executable(!args.no_exec);
    let mut packager = Packager::new(config);

    for pattern in &args.files {
        let count = packager
            .write_files(pattern)
            .with_context(|| format!("Failed to add files matching: {}", pattern))?;
        if count == 0 {
            warn!("No files matched: {}", pattern);
        }
    }
    for module in &args.modules {
        let count = packager
            .write_module(module)
            .with_context(|| format!("Failed to add module: {}", module.display()))?;
        debug!("Module {} added {} files", module.display(), count);
    }

    let files = packager.file_count();
    let written = packager
        .build_to_path(&args.output)
        .with_context(|| format!("Failed to build executable: {}", args.output.display()))?;

    let archive = open_archive(&args.output)?;
    if !archive.tree().stat(&args.entry).is_file {
        warn!("Entry file {} is not part of the archive", args.entry);
    }
    let hash = File::open(&args.output)
        .and_then(content_hash)
        .with_context(|| format!("Failed to hash output: {}", args.output.display()))?;

    info!("Packaged {} files into {}", files, args.output.display());
    writeln!(
        out,
        "{} {} bytes, {} files (blake3 {})",
        args.output.display(),
        written,
        files,
        hash
    )?;
    Ok(())
}

fn list(args: &LsArgs, out: &mut dyn Write) -> Result<()> {
    let archive = open_archive(&args.archive)?;
    let tree = archive.tree();
    let dir = match tree.directory(&args.path) {
        Some(dir) => dir,
        None => bail!("No such directory in archive: {}", args.path),
    };

    if args.recursive {
        let base = args.path.trim_end_matches('/');
        for (path, entry) in dir.files() {
            writeln!(out, "{:>10}  {}{}", entry.byte_length, base, path)?;
        }
        return Ok(());
    }

    for name in dir.ls() {
        write_listing(dir, name, out)?;
    }
    Ok(())
}

fn write_listing(dir: &ReadableTree, name: &str, out: &mut dyn Write) -> Result<()> {
    if dir.cd(name).is_some() {
        writeln!(out, "{:>10}  {}/", "-", name)?;
    } else {
        writeln!(out, "{:>10}  {}", dir.stat_entry(name).size, name)?;
    }
    Ok(())
}

fn cat(args: &CatArgs, out: &mut dyn Write) -> Result<()> {
    let archive = open_archive(&args.archive)?;
    let bytes = archive
        .tree()
        .read_file_sync(&args.path, 0, None)
        .with_context(|| format!("Failed to read {} from archive", args.path))?;
    out.write_all(&bytes)?;
    out.flush()?;
    Ok(())
}

fn show_info(args: &InfoArgs, out: &mut dyn Write) -> Result<()> {
    let archive = open_archive(&args.archive)?;
    let footer = archive.footer();
    let files = archive.tree().files();
    let total: u64 = files.iter().map(|(_, e)| u64::from(e.byte_length)).sum();

    writeln!(out, "entry:          {}", archive.entry_path())?;
    writeln!(out, "runtime size:   {}", footer.header_offset)?;
    writeln!(out, "header:         {} bytes at {}", footer.header_length, footer.header_offset)?;
    writeln!(out, "content:        {} bytes at {}", footer.content_length, footer.content_offset)?;
    writeln!(out, "files:          {} ({} bytes)", files.len(), total)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn fixture() -> (TempDir, PathBuf) {
        let tmp = TempDir::new().unwrap();
        let runtime = tmp.path().join("runtime");
        fs::write(&runtime, b"#!fake runtime\n").unwrap();

        let app = tmp.path().join("app");
        fs::create_dir_all(app.join("lib")).unwrap();
        fs::write(app.join("main.js"), b"require('./lib/util')").unwrap();
        fs::write(app.join("lib/util.js"), b"module.exports = {}").unwrap();

        let module = tmp.path().join("leftpad");
        fs::create_dir_all(&module).unwrap();
        fs::write(module.join("index.js"), b"pad").unwrap();

        let output = tmp.path().join("dist/app");
        let entry = format!("{}/main.js", app.display());
        let args = BuildArgs {
            runtime,
            entry,
            output: output.clone(),
            files: vec![format!("{}/**/*.js", app.display())],
            modules: vec![module],
            modules_root: "/node_modules".to_string(),
            no_exec: false,
        };
        let mut out = Vec::new();
        build(&args, &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("3 files"));
        (tmp, output)
    }

    #[test]
    fn test_build_then_cat() {
        let (_tmp, output) = fixture();
        let mut out = Vec::new();
        cat(
            &CatArgs {
                archive: output,
                path: "/node_modules/leftpad/index.js".to_string(),
            },
            &mut out,
        )
        .unwrap();
        assert_eq!(out, b"pad");
    }

    #[test]
    fn test_ls_marks_directories() {
        let (_tmp, output) = fixture();
        let mut out = Vec::new();
        list(
            &LsArgs {
                archive: output.clone(),
                path: "/node_modules".to_string(),
                recursive: false,
            },
            &mut out,
        )
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap().trim(), "-  leftpad/");

        let mut out = Vec::new();
        list(
            &LsArgs {
                archive: output,
                path: "/node_modules/".to_string(),
                recursive: true,
            },
            &mut out,
        )
        .unwrap();
        assert!(String::from_utf8(out)
            .unwrap()
            .contains("3  /node_modules/leftpad/index.js"));
    }

    #[test]
    fn test_ls_missing_directory() {
        let (_tmp, output) = fixture();
        let args = LsArgs {
            archive: output,
            path: "/nope".to_string(),
            recursive: false,
        };
        assert!(list(&args, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_info() {
        let (_tmp, output) = fixture();
        let mut out = Vec::new();
        show_info(&InfoArgs { archive: output }, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("main.js"));
        assert!(text.contains("runtime size:   15"));
        assert!(text.contains("files:          3"));
    }

    #[test]
    fn test_build_requires_inputs() {
        let args = BuildArgs {
            runtime: PathBuf::from("/bin/true"),
            entry: "/main.js".to_string(),
            output: PathBuf::from("/tmp/out"),
            files: Vec::new(),
            modules: Vec::new(),
            modules_root: "/node_modules".to_string(),
            no_exec: true,
        };
        assert!(build(&args, &mut Vec::new()).is_err());
    }

    #[test]
    fn test_content_hash() {
        let hash1 = content_hash(&b"hello"[..]).unwrap();
        let hash2 = content_hash(&b"hello"[..]).unwrap();
        let hash3 = content_hash(&b"world"[..]).unwrap();

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 8);
        assert_eq!(hash1, blake3::hash(b"hello").to_hex()[..8]);
    }

    #[test]
    fn test_build_reports_output_hash() {
        let tmp = TempDir::new().unwrap();
        let runtime = tmp.path().join("runtime");
        fs::write(&runtime, b"RT").unwrap();
        let input = tmp.path().join("main.js");
        fs::write(&input, b"1").unwrap();

        let output = tmp.path().join("app");
        let args = BuildArgs {
            runtime,
            entry: input.display().to_string(),
            output: output.clone(),
            files: vec![input.display().to_string()],
            modules: Vec::new(),
            modules_root: "/node_modules".to_string(),
            no_exec: true,
        };
        let mut out = Vec::new();
        build(&args, &mut out).unwrap();

        let expected = content_hash(&fs::read(&output).unwrap()[..]).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(&format!("(blake3 {})", expected)));
    }

    #[test]
    fn test_parse_build_args() {
        let cli = Cli::try_parse_from([
            "embin", "build", "-r", "node", "-e", "/main.js", "-o", "out", "a.js", "lib/*.js", "-m", "mods/x",
        ])
        .unwrap();
        match cli.command {
            Command::Build(args) => {
                assert_eq!(args.files, vec!["a.js", "lib/*.js"]);
                assert_eq!(args.modules, vec![PathBuf::from("mods/x")]);
                assert!(!args.no_exec);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
