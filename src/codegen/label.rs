//! Etiquetas de control de flujo.

use std::fmt::{self, Display};
use tracing::trace;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LabelKind {
    /// Punto de convergencia de una cadena `if`.
    EndIf,
    Elif,
    Else,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Label {
    kind: LabelKind,
    number: u32,
}

impl Display for Label {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.kind {
            LabelKind::EndIf => "_end_if_label_",
            LabelKind::Elif => "_elif_label_",
            LabelKind::Else => "_else_label_",
        };

        write!(fmt, "{}{}", prefix, self.number)
    }
}

/// Contadores monotónicos, uno por tipo de etiqueta.
#[derive(Default)]
pub struct Labels {
    end_if: u32,
    elif: u32,
    else_: u32,
}

impl Labels {
    pub fn next(&mut self, kind: LabelKind) -> Label {
        let counter = match kind {
            LabelKind::EndIf => &mut self.end_if,
            LabelKind::Elif => &mut self.elif,
            LabelKind::Else => &mut self.else_,
        };

        let label = Label {
            kind,
            number: *counter,
        };

        *counter += 1;
        trace!(%label, "new label");

        label
    }
}
