use std::cell::RefCell;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use std::sync::Once;

use anyhow::{Context, bail};
use clap::{Args, Parser, Subcommand};
use hss_core::{
    config::VmConfig,
    vm::{self, CompiledProgram, HssbModule, ModuleMeta, NativeTable, Vm, compile_source, render_disassembly},
};
use hss_stdlib::register_stdlib;


static TRACE_INIT: Once = Once::new();
const DEFAULT_TRACE_FILTER: &str = "hss::vm=debug,hss::compiler=debug,hss::hssb=debug,hss::stdlib=debug";
const MODULE_MAGIC: &[u8] = b"HSSB";

#[derive(Debug, Parser)]
#[command(name = "hss", author, version, about = "CLI for HSS", long_about = None)]
struct CliArgs {
    /// Subcommands like `compile FILE`
    #[command(subcommand)]
    command: Option<Commands>,

    /// If no subcommand, run this source (`.hss`) or module (`.hssb`) file
    #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
    file: Option<PathBuf>,

    #[command(flatten)]
    vm: VmArgs,
}

#[derive(Debug, Args)]
struct VmArgs {
    /// TOML file with VM settings
    #[arg(long, global = true, value_name = "FILE", value_parser = parse_sanitized_path)]
    config: Option<PathBuf>,

    /// Operand stack size in bytes (overrides the config file)
    #[arg(long, global = true, value_name = "BYTES")]
    stack_size: Option<usize>,

    /// Abort after this many executed instructions (overrides the config file)
    #[arg(long, global = true, value_name = "N")]
    max_steps: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compile a source file into an `.hssb` module next to it.
    Compile {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
    },
    /// Tokenize, parse and compile without running.
    Check {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
    },
    /// Print the instructions of a source file or module.
    Disasm {
        #[arg(value_name = "FILE", value_parser = parse_sanitized_path)]
        file: PathBuf,
    },
}

fn sanitize_path(raw: &str) -> anyhow::Result<PathBuf> {
    let p = Path::new(raw);

    for comp in p.components() {
        if matches!(comp, Component::ParentDir) {
            bail!("Parent directory components ('..') are not allowed in file paths.");
        }
    }

    Ok(p.to_path_buf())
}

fn parse_sanitized_path(raw: &str) -> Result<PathBuf, String> {
    sanitize_path(raw).map_err(|e| e.to_string())
}

fn env_toggle_enabled(raw: &str) -> bool {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return false;
    }
    !(trimmed.eq_ignore_ascii_case("0") || trimmed.eq_ignore_ascii_case("false") || trimmed.eq_ignore_ascii_case("off"))
}

fn filter_expr_from(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("1")
        || trimmed.eq_ignore_ascii_case("true")
        || trimmed.eq_ignore_ascii_case("on")
    {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn maybe_init_tracing() {
    let raw = match std::env::var("HSS_TRACE") {
        Ok(value) => value,
        Err(_) => return,
    };

    if !env_toggle_enabled(&raw) {
        return;
    }

    TRACE_INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;
        use tracing_subscriber::fmt;

        let filter_expr = filter_expr_from(&raw).or_else(|| std::env::var("RUST_LOG").ok());

        let builder = fmt().with_writer(std::io::stderr);

        let builder = match filter_expr.and_then(|expr| EnvFilter::try_new(expr).ok()) {
            Some(filter) => builder.with_env_filter(filter),
            None => builder.with_env_filter(DEFAULT_TRACE_FILTER),
        };

        let _ = builder.try_init();
    });
}

fn debug_bytecode_enabled() -> bool {
    std::env::var("HSS_DEBUG_BYTECODE").is_ok_and(|raw| env_toggle_enabled(&raw))
}

/// Config file (if any) with command line overrides applied.
fn resolve_config(args: &VmArgs) -> anyhow::Result<VmConfig> {
    let mut config = match &args.config {
        Some(path) => VmConfig::load(path)?,
        None => VmConfig::default(),
    };
    if let Some(size) = args.stack_size {
        config.data_stack_size = size;
    }
    if let Some(steps) = args.max_steps {
        config.max_steps = Some(steps);
    }
    config.validate()?;
    Ok(config)
}

fn stdout_natives() -> anyhow::Result<NativeTable> {
    let mut natives = NativeTable::new();
    register_stdlib(&mut natives, Rc::new(RefCell::new(std::io::stdout())))?;
    Ok(natives)
}

/// Compile a source file or decode a module, depending on its leading bytes.
fn load_program(path: &Path, natives: &NativeTable) -> anyhow::Result<CompiledProgram> {
    let display = path.display();
    let raw = std::fs::read(path).with_context(|| format!("Failed to read file '{}'", display))?;

    let program = if raw.starts_with(MODULE_MAGIC) {
        let module = vm::decode_module(&raw).with_context(|| format!("Failed to decode HSSB from {}", display))?;
        natives
            .ensure_layout(&module.program.natives)
            .with_context(|| format!("{} was compiled against a different native table", display))?;
        module.program
    } else {
        let src = String::from_utf8(raw).with_context(|| format!("{} is not valid UTF-8", display))?;
        compile_source(&src, natives)?
    };

    if debug_bytecode_enabled() {
        eprintln!("-- bytecode for {} --", display);
        eprint!("{}", program.disassemble()?);
    }
    Ok(program)
}

fn run_file(path: &Path, config: &VmConfig) -> anyhow::Result<()> {
    let natives = stdout_natives()?;
    let program = load_program(path, &natives)?;
    let result = program.result;

    let mut machine = Vm::with_config(program.into_stream(), config, natives)?;
    machine.run_with_budget(config.batch_size, config.max_steps)?;

    if let Some(ty) = result {
        let value = machine
            .stack()
            .peek_value(ty)
            .context("program finished without its result on the stack")?;
        println!("{}", value);
    }
    Ok(())
}

fn compile_file(path: &Path) -> anyhow::Result<()> {
    let natives = stdout_natives()?;
    let program = load_program(path, &natives)?;

    let mut meta = ModuleMeta {
        source: Some(path.to_string_lossy().to_string()),
        ..Default::default()
    };
    meta.tags.insert("compiler".to_string(), format!("hss {}", env!("CARGO_PKG_VERSION")));
    let module = HssbModule::new(program).with_meta(meta);

    let out_path = path.with_extension("hssb");
    let bytes = vm::encode_module(&module)?;
    std::fs::write(&out_path, &bytes)
        .with_context(|| format!("Failed to write bytecode to {}", out_path.display()))?;
    eprintln!("Emitted bytecode to {} ({} bytes)", out_path.display(), bytes.len());
    Ok(())
}

fn check_file(path: &Path) -> anyhow::Result<()> {
    let natives = stdout_natives()?;
    let program = load_program(path, &natives)?;
    match program.result {
        Some(ty) => eprintln!("{}: ok ({} bytes, result {})", path.display(), program.code.len(), ty),
        None => eprintln!("{}: ok ({} bytes)", path.display(), program.code.len()),
    }
    Ok(())
}

fn disasm_file(path: &Path) -> anyhow::Result<()> {
    let natives = stdout_natives()?;
    let program = load_program(path, &natives)?;
    for (index, import) in program.natives.iter().enumerate() {
        println!("; native #{} {}", index, import);
    }
    if let Some(ty) = program.result {
        println!("; result {}", ty);
    }
    print!("{}", render_disassembly(&program.code)?);
    Ok(())
}

fn run(args: CliArgs) -> anyhow::Result<()> {
    let CliArgs { command, file, vm } = args;
    let config = resolve_config(&vm)?;

    match (command, file) {
        (Some(Commands::Compile { file }), _) => compile_file(&file),
        (Some(Commands::Check { file }), _) => check_file(&file),
        (Some(Commands::Disasm { file }), _) => disasm_file(&file),
        (None, Some(file)) => run_file(&file, &config),
        (None, None) => bail!("no input file; run `hss --help` for usage"),
    }
}

fn main() {
    maybe_init_tracing();

    if let Err(err) = run(CliArgs::parse()) {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}
