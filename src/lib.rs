//! Compilador de una sola pasada para el lenguaje `.crm`.
//!
//! # Front end
//! Cada programa deriva de un único archivo de código fuente.
//! Este archivo se somete primero a análisis léxico en [`lex`], de
//! lo cual se obtiene un flujo de tokens. El flujo de tokens se
//! dispone en un AST por medio de análisis sintáctico en [`parse`].
//! Los nodos del árbol se almacenan en una [`arena`] y las reglas de
//! visibilidad de identificadores se validan durante el mismo recorrido
//! por medio de una tabla de ámbitos ([`scope`]). Todos los errores de
//! estas fases se acumulan en un colector de [`error::Diagnostics`].
//!
//! # Back end
//! Si no hubo diagnósticos, el AST se traduce directamente a ensamblador
//! NASM para x86-64 Linux bajo una disciplina de máquina de pila en
//! [`codegen`]. El ensamblado y enlazado del ejecutable final se delega
//! a `nasm` y `ld` en [`link`].

use std::rc::Rc;
use thiserror::Error;

#[macro_use]
mod macros;

pub mod arena;
pub mod ast;
pub mod codegen;
pub mod error;
pub mod lex;
pub mod link;
pub mod parse;
pub mod scope;
pub mod source;

use crate::{
    arena::{Arena, DEFAULT_CAPACITY},
    codegen::InternalError,
    error::Diagnostics,
    parse::FatalError,
    source::Source,
};

/// Parámetros de una compilación.
#[derive(Copy, Clone, Debug)]
pub struct CompileOptions {
    /// Cantidad máxima de nodos del AST.
    pub arena_capacity: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            arena_capacity: DEFAULT_CAPACITY,
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CompileError {
    /// El programa tiene errores léxicos, sintácticos o semánticos.
    #[error("aborting due to {} previous error(s)", .0.len())]
    Rejected(Diagnostics),

    /// Agotamiento de la arena o anidamiento excesivo.
    #[error(transparent)]
    Fatal(#[from] FatalError),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

/// Compila una unidad completa a texto ensamblador.
///
/// La generación de código solo ocurre si ninguna fase previa registró
/// diagnósticos.
pub fn compile(source: &Rc<Source>, options: &CompileOptions) -> Result<String, CompileError> {
    let mut diagnostics = Diagnostics::default();

    let tokens = lex::tokenize(source, &mut diagnostics);
    let arena = Arena::with_capacity(options.arena_capacity);
    let ast = parse::parse(source, &tokens, arena, &mut diagnostics)?;

    if !diagnostics.is_empty() {
        return Err(CompileError::Rejected(diagnostics));
    }

    Ok(codegen::generate(&ast)?)
}
