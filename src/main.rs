//! Punto de entrada ("driver").
//!
//! Este módulo orquesta las diferentes fases del proceso de
//! compilación y expone una CLI.

use anyhow::{self, bail, Context};
use cer::{
    link::{LinkOptions, Linker},
    source::Source,
    CompileError, CompileOptions,
};

use clap::{crate_version, Arg, ArgMatches, Command};
use std::{
    ffi::OsStr,
    fs,
    io::{self, Write},
    path::Path,
    process,
};

fn main() {
    init_tracing();

    if let Err(error) = run(cli().get_matches()) {
        eprintln!("cer: error: {:#}", error);
        process::exit(1);
    }
}

fn cli() -> Command<'static> {
    Command::new("cer")
        .version(crate_version!())
        .about("Compiler for the .crm language")
        .arg(
            Arg::new("input")
                .value_name("FILE")
                .required(true)
                .help("Source file (.crm)"),
        )
        .arg(
            Arg::new("asm")
                .short('S')
                .help("Generate assembly instead of linking"),
        )
        .arg(Arg::new("strip").short('s').help("Strip executables"))
        .arg(
            Arg::new("keep")
                .short('d')
                .long("keep")
                .help("Keep intermediate .asm and .o files"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .takes_value(true)
                .value_name("FILE")
                .default_value("out")
                .help("Output file ('-' along with -S for stdout)"),
        )
}

fn run(args: ArgMatches) -> anyhow::Result<()> {
    let input = Path::new(args.value_of("input").context("No input file")?);
    if input.extension() != Some(OsStr::new("crm")) {
        bail!("{}: expected a `.crm` source file", input.display());
    }

    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read source file: {}", input.display()))?;

    let source = Source::new(input.display().to_string(), text);
    let asm = match cer::compile(&source, &CompileOptions::default()) {
        Ok(asm) => asm,

        // Los diagnósticos se reportan todos antes de abortar. Los errores
        // del compilador no son `Send`, por lo cual se reportan como texto
        Err(error) => {
            if let CompileError::Rejected(diagnostics) = &error {
                eprint!("{}", diagnostics);
            }

            bail!("{}", error);
        }
    };

    let output = args.value_of("output").unwrap_or("out");
    match (args.is_present("asm"), output) {
        // Salida a stdout sin enlazado
        (true, "-") => io::stdout()
            .write_all(asm.as_bytes())
            .context("Failed to emit to stdout")?,

        // Salida a archivo sin enlazado
        (true, path) => {
            fs::write(path, &asm).with_context(|| format!("Failed to emit to file: {}", path))?
        }

        // Salida a stdout con enlazado
        (false, "-") => bail!("Refusing to write executable to stdout"),

        // Salida a archivo con enlazado
        (false, path) => {
            let mut options = LinkOptions::empty();
            if args.is_present("strip") {
                options |= LinkOptions::STRIP;
            }

            if args.is_present("keep") {
                options |= LinkOptions::KEEP_TEMPS;
            }

            let mut linker = Linker::new(&path, options).context("Failed to link")?;
            linker
                .input()
                .write_all(asm.as_bytes())
                .context("Failed to emit assembly to assembler")?;

            linker
                .finish()
                .with_context(|| format!("Failed to generate executable: {}", path))?;
        }
    };

    Ok(())
}

/// Solo se instala un subscriber si `RUST_LOG` está definida.
fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(io::stderr).with_target(true))
            .with(EnvFilter::from_default_env())
            .init();
    }
}
