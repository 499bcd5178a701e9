//! Tabla de ámbitos léxicos.
//!
//! Cada declaración se registra bajo la llave explícita
//! `(nombre, profundidad)`. La resolución busca desde el ámbito más
//! interno hacia el global, lo cual implementa sombreado de variables.
//! El parser utiliza una tabla para validar usos y declaraciones; el
//! generador de código mantiene una tabla propia e independiente para
//! calcular la posición de cada variable en la pila.

use std::collections::HashMap;
use thiserror::Error;
use tracing::trace;

use crate::lex::Identifier;

/// Una variable visible.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub name: Identifier,
    pub depth: u32,
    pub slot: usize,
}

/// El nombre ya existe en el ámbito actual.
#[derive(Error, Debug, PartialEq, Eq)]
#[error("`{0}` is already declared in this scope")]
pub struct Duplicate(pub Identifier);

#[derive(Hash, PartialEq, Eq)]
struct ScopedName {
    name: Identifier,
    depth: u32,
}

pub struct ScopeTable {
    entries: HashMap<ScopedName, Entry>,
    /// Nombres declarados en cada ámbito abierto, en orden de declaración.
    /// El primer marco es el ámbito global y nunca se cierra.
    frames: Vec<Vec<Identifier>>,
}

impl Default for ScopeTable {
    fn default() -> Self {
        ScopeTable::new()
    }
}

impl ScopeTable {
    pub fn new() -> Self {
        ScopeTable {
            entries: HashMap::new(),
            frames: vec![Vec::new()],
        }
    }

    /// Profundidad del ámbito actual, 0 para el global.
    pub fn depth(&self) -> u32 {
        self.frames.len() as u32 - 1
    }

    /// Cantidad de variables vivas en todos los ámbitos abiertos.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declara `name` en el ámbito actual con la posición `slot`.
    pub fn declare(&mut self, name: Identifier, slot: usize) -> Result<&Entry, Duplicate> {
        let depth = self.depth();
        let key = ScopedName {
            name: name.clone(),
            depth,
        };

        if self.entries.contains_key(&key) {
            return Err(Duplicate(name));
        }

        trace!(%name, depth, slot, "declare");
        if let Some(frame) = self.frames.last_mut() {
            frame.push(name.clone());
        }

        Ok(&*self.entries.entry(key).or_insert(Entry { name, depth, slot }))
    }

    /// Busca la declaración visible más interna de `name`.
    pub fn resolve(&self, name: &Identifier) -> Option<&Entry> {
        (0..=self.depth()).rev().find_map(|depth| {
            let key = ScopedName {
                name: name.clone(),
                depth,
            };

            self.entries.get(&key)
        })
    }

    pub fn open_scope(&mut self) {
        self.frames.push(Vec::new());
        trace!(depth = self.depth(), "open scope");
    }

    /// Cierra el ámbito actual y retorna sus entradas en orden de declaración.
    ///
    /// Retorna `None` si solo queda el ámbito global.
    pub fn close_scope(&mut self) -> Option<Vec<Entry>> {
        if self.frames.len() <= 1 {
            return None;
        }

        let depth = self.depth();
        let names = self.frames.pop()?;

        trace!(depth, variables = names.len(), "close scope");
        let closed = names
            .into_iter()
            .filter_map(|name| self.entries.remove(&ScopedName { name, depth }))
            .collect();

        Some(closed)
    }
}
