//! Construcción de ejecutables.
//!
//! Una vez que se ha emitido código ensamblador, este debe ser
//! ensamblado con `nasm` y enlazado con `ld` para producir un binario
//! ejecutable. El código se escribe primero a un archivo `.asm` junto
//! a la ruta de salida; tanto este como el objeto intermedio se
//! eliminan al terminar, salvo que se indique lo contrario.

use std::{
    ffi::OsString,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};

use bitflags::bitflags;
use thiserror::Error;
use tracing::{debug, warn};

bitflags! {
    /// Opciones a aplicar durante el enlazado.
    pub struct LinkOptions: u32 {
        /// Remover símbolos de depuración del ejecutable final.
        const STRIP = 0x01;

        /// Conservar los archivos `.asm` y `.o` intermedios.
        const KEEP_TEMPS = 0x02;
    }
}

/// Un error de ensamblado o enlazado.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum LinkerError {
    /// Ocurrió un evento de error de E/S durante la invocación
    /// de comandos externos.
    #[error("I/O error")]
    Io(#[from] std::io::Error),

    /// Un comando inició su ejecución, pero falló.
    #[error("`{0}` exited with status code {1:?}")]
    Failed(&'static str, ExitStatus),
}

/// Instancia del enlazador para un ejecutable definido.
pub struct Linker {
    output: PathBuf,
    asm: PathBuf,
    object: PathBuf,
    options: LinkOptions,
    writer: BufWriter<File>,
}

impl Linker {
    /// Prepara el enlazado de un ejecutable en la ruta `output`.
    pub fn new<O>(output: &O, options: LinkOptions) -> Result<Self, LinkerError>
    where
        O: AsRef<Path>,
    {
        let output = output.as_ref().to_path_buf();
        let asm = with_suffix(&output, ".asm");
        let object = with_suffix(&output, ".o");
        let writer = BufWriter::new(File::create(&asm)?);

        Ok(Linker {
            output,
            asm,
            object,
            options,
            writer,
        })
    }

    /// Destino del código ensamblador.
    ///
    /// Se debe escribir código ensamblador en la forma exacta en que fue
    /// emitido por la generación de código antes de llamar [`Linker::finish()`].
    pub fn input(&mut self) -> &mut BufWriter<File> {
        &mut self.writer
    }

    /// Indica el fin del flujo de código, ensambla y enlaza.
    pub fn finish(self) -> Result<(), LinkerError> {
        let Linker {
            output,
            asm,
            object,
            options,
            mut writer,
        } = self;

        writer.flush()?;
        drop(writer);

        let result = build(&output, &asm, &object, options);
        if !options.contains(LinkOptions::KEEP_TEMPS) {
            for temp in [&asm, &object] {
                if let Err(error) = fs::remove_file(temp) {
                    warn!(path = %temp.display(), %error, "failed to remove temporary file");
                }
            }
        }

        result
    }
}

fn build(output: &Path, asm: &Path, object: &Path, options: LinkOptions) -> Result<(), LinkerError> {
    let mut nasm = Command::new("nasm");
    nasm.arg("-felf64").arg("-o").arg(object).arg(asm);
    run("nasm", nasm)?;

    let mut ld = Command::new("ld");
    ld.arg("-o").arg(output).arg(object);

    if options.contains(LinkOptions::STRIP) {
        ld.arg("-s");
    }

    run("ld", ld)
}

fn run(name: &'static str, mut command: Command) -> Result<(), LinkerError> {
    debug!(?command, "spawning {}", name);

    let status = command.status()?;
    if status.success() {
        Ok(())
    } else {
        Err(LinkerError::Failed(name, status))
    }
}

/// `out` => `out.asm`, sin reemplazar extensiones existentes.
fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
