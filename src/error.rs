//! Diagnósticos acumulados.
//!
//! Los errores léxicos, sintácticos y semánticos no detienen la
//! compilación al ocurrir. Cada fase los registra en un [`Diagnostics`]
//! que recorre el pipeline completo, de modo que una misma ejecución
//! reporte tantos errores como sea posible. El driver inspecciona el
//! colector antes de pasar a generación de código.

use crate::source::{Located, Location};
use std::{
    error::Error,
    fmt::{self, Debug, Display},
};

mod sealed {
    pub trait Sealed {}
}

/// Categoría de un diagnóstico.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Lexical,
    Syntax,
    Semantic,
}

impl Display for ErrorKind {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            ErrorKind::Lexical => "lexical error",
            ErrorKind::Syntax => "syntax error",
            ErrorKind::Semantic => "semantic error",
        };

        fmt.write_str(kind)
    }
}

/// Errores que pertenecen a alguna categoría de diagnóstico.
pub trait Classified: Error {
    const KIND: ErrorKind;
}

pub trait LocatedError: sealed::Sealed {
    fn source(&self) -> &dyn Error;
    fn location(&self) -> &Location;
    fn kind(&self) -> ErrorKind;
}

#[derive(Default)]
pub struct Diagnostics {
    errors: Vec<Box<dyn 'static + LocatedError>>,
}

impl Diagnostics {
    pub fn push<E: 'static + Classified>(&mut self, error: Located<E>) {
        self.errors.push(Box::new(error));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn LocatedError> {
        self.errors.iter().map(|error| error.as_ref())
    }

    /// Cantidad de diagnósticos de una categoría.
    pub fn count(&self, kind: ErrorKind) -> usize {
        self.iter().filter(|error| error.kind() == kind).count()
    }
}

impl Display for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        for error in &self.errors {
            writeln!(
                fmt,
                "{}: {}: {}",
                error.location(),
                error.kind(),
                error.source()
            )?;
        }

        Ok(())
    }
}

impl Debug for Diagnostics {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_list()
            .entries(self.errors.iter().map(|error| error.source().to_string()))
            .finish()
    }
}

impl<E: Classified> sealed::Sealed for Located<E> {}

impl<E: Classified> LocatedError for Located<E> {
    fn source(&self) -> &dyn Error {
        self.as_ref()
    }

    fn location(&self) -> &Location {
        Located::location(self)
    }

    fn kind(&self) -> ErrorKind {
        E::KIND
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Position, Source};
    use thiserror::Error;

    #[derive(Error, Debug)]
    #[error("something odd")]
    struct Odd;

    impl Classified for Odd {
        const KIND: ErrorKind = ErrorKind::Syntax;
    }

    #[test]
    fn renders_one_line_per_error() {
        let source = Source::new("odd.crm", "");
        let mut diagnostics = Diagnostics::default();
        diagnostics.push(Located::at(Odd, Location::new(&source, Position::new(2, 7))));
        diagnostics.push(Located::at(Odd, Location::new(&source, Position::new(4, 1))));

        assert_eq!(diagnostics.count(ErrorKind::Syntax), 2);
        assert_eq!(
            diagnostics.to_string(),
            "odd.crm::2:7: syntax error: something odd\n\
             odd.crm::4:1: syntax error: something odd\n"
        );
    }
}
