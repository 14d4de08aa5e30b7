//! IPE - linguagem imperativa com palavras-chave em português
//! Command-line interface for compiling, running and inspecting IPE programs

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::*;
use ipe_core::{Image, Machine, VmConfig, listing};
use ipe_lang::{Compiler, CompilerConfig, Diagnostic, MANIFEST_FILE, Manifest, create_manifest};
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "ipe")]
#[command(author = "Silvano Neto <dev@silvanoneto.com>")]
#[command(version = "2026.1.16")]
#[command(about = "IPE - linguagem imperativa com palavras-chave em português", long_about = None)]
struct Cli {
    /// Log compiler and VM events to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new IPE project
    New {
        /// Project name
        #[arg(value_name = "NAME")]
        name: String,

        /// Author name and email (e.g., "Name <email@example.com>")
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Initialize an IPE project in the current directory
    Init {
        /// Author name and email (e.g., "Name <email@example.com>")
        #[arg(short, long)]
        author: Option<String>,
    },

    /// Compile to a bytecode image (.ipec)
    Build {
        /// Input source (.ipe) or directory with ipe.toml
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,

        /// Output image file (.ipec)
        #[arg(short, long, value_name = "OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Run a source file, a project or a compiled image
    Run {
        /// Input source (.ipe), image (.ipec) or directory with ipe.toml
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,

        /// Stop after this many instructions
        #[arg(long, value_name = "N")]
        max_cycles: Option<u64>,
    },

    /// Compile without writing an image and report diagnostics
    Check {
        /// Input source (.ipe) or directory with ipe.toml
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,

        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the code of a compiled program
    Disasm {
        /// Input source (.ipe), image (.ipec) or directory with ipe.toml
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,
    },

    /// Show information about IPE
    Info,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::New { name, author } => new_command(&name, author.as_deref()),
        Commands::Init { author } => init_command(author.as_deref()),
        Commands::Build { input, output } => build_command(input.as_deref(), output.as_deref()),
        Commands::Run { input, max_cycles } => run_command(input.as_deref(), max_cycles),
        Commands::Check { input, json } => check_command(input.as_deref(), json),
        Commands::Disasm { input } => disasm_command(input.as_deref()),
        Commands::Info => {
            print_info();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "error:".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("ipe=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ipe=warn"))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ============================================================================
// Project scaffolding commands
// ============================================================================

const MAIN_SOURCE: &str = r#"// Ponto de entrada do programa
programa principal;

função saudacao(nome: char*) {
    escrevaln "Olá, ", nome, "!";
}

saudacao("mundo");
"#;

const GITIGNORE: &str = "/target\n*.ipec\n";

fn new_command(name: &str, author: Option<&str>) -> Result<()> {
    let project_dir = PathBuf::from(name);

    if project_dir.exists() {
        bail!("Directory '{}' already exists", name);
    }

    println!("{} new project '{}'", "Creating".green().bold(), name.cyan());

    fs::create_dir_all(project_dir.join("src"))?;

    let authors = author.map(|a| vec![a.to_string()]).unwrap_or_default();
    let manifest = create_manifest(name, authors);
    fs::write(project_dir.join(MANIFEST_FILE), manifest.to_toml()?)?;
    fs::write(project_dir.join("src/main.ipe"), MAIN_SOURCE)?;
    fs::write(project_dir.join(".gitignore"), GITIGNORE)?;

    println!("{} {}", "   Created".green().bold(), MANIFEST_FILE.cyan());
    println!("{} {}", "   Created".green().bold(), "src/main.ipe".cyan());
    println!("{} {}", "   Created".green().bold(), ".gitignore".cyan());
    println!();
    println!("{}", "To get started, run:".bold());
    println!("  cd {}", name);
    println!("  ipe run");

    Ok(())
}

fn init_command(author: Option<&str>) -> Result<()> {
    let current_dir = std::env::current_dir()?;
    let manifest_path = current_dir.join(MANIFEST_FILE);

    if manifest_path.exists() {
        bail!("{} already exists in this directory", MANIFEST_FILE);
    }

    let name = current_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("meu-projeto");

    println!(
        "{} project in '{}'",
        "Initializing".green().bold(),
        current_dir.display().to_string().cyan()
    );

    let src_dir = current_dir.join("src");
    fs::create_dir_all(&src_dir)?;

    let authors = author.map(|a| vec![a.to_string()]).unwrap_or_default();
    let manifest = create_manifest(name, authors);
    fs::write(&manifest_path, manifest.to_toml()?)?;

    let main_path = src_dir.join("main.ipe");
    if !main_path.exists() {
        fs::write(&main_path, MAIN_SOURCE)?;
        println!("{} {}", "   Created".green().bold(), "src/main.ipe".cyan());
    }
    let gitignore = current_dir.join(".gitignore");
    if !gitignore.exists() {
        fs::write(&gitignore, GITIGNORE)?;
        println!("{} {}", "   Created".green().bold(), ".gitignore".cyan());
    }

    println!("{} {}", "   Created".green().bold(), MANIFEST_FILE.cyan());
    println!();
    println!("{}", "Project initialized. Run 'ipe run' to execute.".bold());

    Ok(())
}

// ============================================================================
// Input resolution
// ============================================================================

enum InputMode {
    /// A single `.ipe` file; imports are looked up next to it
    SingleFile(PathBuf),
    /// Directory holding `ipe.toml`
    Project(PathBuf),
    /// A compiled `.ipec` image
    Image(PathBuf),
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().is_some_and(|e| e == ext)
}

/// File, image or project named by `input`; with no input, the project around the current directory
fn resolve_input(input: Option<&Path>) -> Result<InputMode> {
    match input {
        Some(path) if has_extension(path, "ipe") => Ok(InputMode::SingleFile(path.to_path_buf())),
        Some(path) if has_extension(path, "ipec") => Ok(InputMode::Image(path.to_path_buf())),
        Some(path) => {
            let manifest_path = if path.is_dir() {
                path.join(MANIFEST_FILE)
            } else if path.file_name().is_some_and(|n| n == MANIFEST_FILE) {
                path.to_path_buf()
            } else {
                bail!("Unknown input type: {}", path.display());
            };

            match manifest_path.parent() {
                Some(root) if manifest_path.exists() => Ok(InputMode::Project(root.to_path_buf())),
                _ => bail!("No {} found in {}", MANIFEST_FILE, path.display()),
            }
        }
        None => {
            let current_dir = std::env::current_dir()?;
            let (_, root) = Manifest::find_and_load(&current_dir)
                .context("No input file specified and no project found")?;
            Ok(InputMode::Project(root))
        }
    }
}

/// A compiled program and the VM settings that go with it
struct Compiled {
    image: Image,
    vm: VmConfig,
}

fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{} {}", "error:".red().bold(), diagnostic);
    }
}

fn compile_source_file(path: &Path, config: CompilerConfig) -> Result<Image> {
    let mut compiler = Compiler::new(config);
    if !compiler.compile_file(path) {
        print_diagnostics(compiler.diagnostics());
        bail!("could not compile '{}'", path.display());
    }
    compiler
        .take_image()
        .with_context(|| format!("no image produced for '{}'", path.display()))
}

fn single_file_config(path: &Path) -> CompilerConfig {
    let search_root = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    CompilerConfig {
        search_root,
        ..CompilerConfig::default()
    }
}

fn load_manifest(project_root: &Path) -> Result<Manifest> {
    Ok(Manifest::from_file(&project_root.join(MANIFEST_FILE))?)
}

fn compile_input(mode: &InputMode) -> Result<Compiled> {
    match mode {
        InputMode::SingleFile(path) => {
            let image = compile_source_file(path, single_file_config(path))?;
            Ok(Compiled {
                image,
                vm: VmConfig::default(),
            })
        }
        InputMode::Project(root) => {
            let manifest = load_manifest(root)?;
            let image = compile_source_file(&manifest.entry_path(root), manifest.compiler_config(root))?;
            Ok(Compiled {
                image,
                vm: manifest.vm,
            })
        }
        InputMode::Image(path) => {
            let image = Image::load(path).with_context(|| format!("could not load '{}'", path.display()))?;
            Ok(Compiled {
                image,
                vm: VmConfig::default(),
            })
        }
    }
}

// ============================================================================
// Compilation commands
// ============================================================================

fn build_command(input: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let mode = resolve_input(input)?;
    let output_path = match (&mode, output) {
        (_, Some(path)) => path.to_path_buf(),
        (InputMode::SingleFile(path), None) => path.with_extension("ipec"),
        (InputMode::Project(root), None) => {
            let manifest = load_manifest(root)?;
            let output_dir = manifest.output_dir(root);
            fs::create_dir_all(&output_dir)?;
            output_dir.join(format!("{}.ipec", manifest.package.name))
        }
        (InputMode::Image(path), None) => bail!("'{}' is already an image", path.display()),
    };

    match &mode {
        InputMode::Project(root) => {
            let manifest = load_manifest(root)?;
            println!(
                "{} {} v{}",
                "   Building".green().bold(),
                manifest.package.name.cyan(),
                manifest.package.version
            );
        }
        InputMode::SingleFile(path) | InputMode::Image(path) => {
            println!("{} {}", "   Building".green().bold(), path.display().to_string().cyan());
        }
    }

    let compiled = compile_input(&mode)?;
    let bytes = compiled.image.to_bytes();
    fs::write(&output_path, &bytes)?;

    println!(
        "{} {} ({} bytes)",
        "   Created".green().bold(),
        output_path.display().to_string().cyan(),
        bytes.len()
    );
    println!("{}", "    Finished".green().bold());
    Ok(())
}

fn run_command(input: Option<&Path>, max_cycles: Option<u64>) -> Result<()> {
    let mode = resolve_input(input)?;
    let mut compiled = compile_input(&mode)?;
    if max_cycles.is_some() {
        compiled.vm.max_cycles = max_cycles;
    }

    let mut machine = Machine::new(compiled.vm);
    machine.load(&compiled.image)?;
    let result = machine.run();
    std::io::stdout().flush()?;

    let stats = result?;
    debug!(cycles = stats.cycles, "program finished");
    Ok(())
}

fn check_command(input: Option<&Path>, json: bool) -> Result<()> {
    let mode = resolve_input(input)?;
    let (path, config) = match &mode {
        InputMode::SingleFile(path) => (path.clone(), single_file_config(path)),
        InputMode::Project(root) => {
            let manifest = load_manifest(root)?;
            (manifest.entry_path(root), manifest.compiler_config(root))
        }
        InputMode::Image(path) => bail!("'{}' is a compiled image", path.display()),
    };

    let mut compiler = Compiler::new(config);
    let ok = compiler.compile_file(&path);

    if json {
        println!("{}", serde_json::to_string_pretty(compiler.diagnostics())?);
    } else if ok {
        println!(
            "{} {} - no errors found",
            "    Finished".green().bold(),
            path.display().to_string().cyan()
        );
    } else {
        print_diagnostics(compiler.diagnostics());
    }

    if !ok {
        bail!("could not compile '{}'", path.display());
    }
    Ok(())
}

fn disasm_command(input: Option<&Path>) -> Result<()> {
    let mode = resolve_input(input)?;
    let image = compile_input(&mode)?.image;

    println!("{}", "Image:".bold());
    println!("  data:    {} bytes", image.data_size);
    println!("  code:    {} bytes", image.code().len());
    println!("  entry:   {:04X}", image.entry());

    if !image.externs.is_empty() {
        println!();
        println!("{}", "Externs:".bold());
        for (index, ext) in image.externs.iter().enumerate() {
            println!("  {:3}  {} ({} bytes of arguments)", index, ext.name.cyan(), ext.param_bytes);
        }
    }

    println!();
    println!("{}", "Code:".bold());
    print!("{}", listing(&image.bytes, image.entry(), image.bytes.len() as u32)?);
    Ok(())
}

fn print_info() {
    println!("{}", "IPE - linguagem imperativa com palavras-chave em português".bold());
    println!();
    println!("A small statically typed language compiled to a stack bytecode VM.");
    println!();
    println!("{}", "Language:".bold());
    println!("  • {} Types: bool, byte, char, short, int, long, float, double", "✓".green());
    println!("  • {} Pointers, multi-dimensional arrays, structures, type aliases", "✓".green());
    println!("  • {} Functions with value and 'ref' parameters, recursion", "✓".green());
    println!("  • {} Units ('unidade') imported with 'importe'", "✓".green());
    println!("  • {} Host functions declared with 'externa' (see 'importe sistema')", "✓".green());
    println!();
    println!("{}", "Architecture:".bold());
    println!("  IPE Source (.ipe)");
    println!("       ↓  lexer, parser");
    println!("  AST");
    println!("       ↓  declare, resolve, codegen per unit");
    println!("  Image (.ipec)");
    println!("       ↓");
    println!("  Stack VM");
    println!();
    println!("{}", "Project Commands:".bold());
    println!("  ipe new meu-projeto              # Create new project");
    println!("  ipe init                         # Initialize project in current dir");
    println!("  ipe build                        # Build project image");
    println!("  ipe run                          # Build and run project");
    println!();
    println!("{}", "File Commands:".bold());
    println!("  ipe run programa.ipe             # Compile and run a file");
    println!("  ipe run programa.ipec            # Run a compiled image");
    println!("  ipe check programa.ipe --json    # Report diagnostics as JSON");
    println!("  ipe disasm programa.ipe          # Show the generated code");
    println!("  ipe info                         # Show this info");
}
