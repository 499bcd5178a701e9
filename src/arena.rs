//! Almacenamiento de nodos del AST.
//!
//! Cada tipo de nodo tiene su propio pool contiguo dentro de un [`Arena`]
//! y se direcciona con un [`Id`] estable de 32 bits. Ningún nodo se libera
//! individualmente: la arena completa se descarta al terminar de usar el
//! AST de una unidad de compilación. La capacidad total es fija; agotarla
//! es una condición fatal.

use crate::ast::{ElseChain, Expr, Statement};
use std::{
    fmt::{self, Debug},
    hash::{Hash, Hasher},
    marker::PhantomData,
    ops::Index,
};

use thiserror::Error;

/// Capacidad por omisión, en nodos, para una unidad de compilación.
pub const DEFAULT_CAPACITY: usize = 1 << 18;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
    #[error("out of memory: syntax tree exceeds {0} nodes")]
    Exhausted(usize),
}

/// Handle a un nodo de tipo `T`.
pub struct Id<T> {
    index: u32,
    marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    fn new(index: usize) -> Self {
        Id {
            index: index as u32,
            marker: PhantomData,
        }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }
}

impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> Debug for Id<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "#{}", self.index)
    }
}

/// Pool contiguo para un solo tipo de nodo.
#[derive(Debug)]
pub struct Pool<T>(Vec<T>);

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Pool(Vec::new())
    }
}

/// Tipos que pueden almacenarse en un [`Arena`].
pub trait Node: Sized {
    fn pool(arena: &Arena) -> &Pool<Self>;

    fn pool_mut(arena: &mut Arena) -> &mut Pool<Self>;
}

macro_rules! nodes {
    ($($type:ty => $field:ident),* $(,)?) => {
        $(
            impl Node for $type {
                fn pool(arena: &Arena) -> &Pool<Self> {
                    &arena.$field
                }

                fn pool_mut(arena: &mut Arena) -> &mut Pool<Self> {
                    &mut arena.$field
                }
            }
        )*
    };
}

nodes! {
    Expr => exprs,
    Statement => stmts,
    ElseChain => chains,
}

#[derive(Debug)]
pub struct Arena {
    exprs: Pool<Expr>,
    stmts: Pool<Statement>,
    chains: Pool<ElseChain>,
    used: usize,
    capacity: usize,
}

impl Default for Arena {
    fn default() -> Self {
        Arena::with_capacity(DEFAULT_CAPACITY)
    }
}

impl Arena {
    /// Crea una arena vacía capaz de contener `capacity` nodos en total.
    pub fn with_capacity(capacity: usize) -> Self {
        Arena {
            exprs: Pool::default(),
            stmts: Pool::default(),
            chains: Pool::default(),
            used: 0,
            capacity: capacity.min(u32::MAX as usize),
        }
    }

    /// Mueve un nodo a la arena y retorna su handle.
    pub fn alloc<T: Node>(&mut self, node: T) -> Result<Id<T>, ArenaError> {
        if self.used >= self.capacity {
            return Err(ArenaError::Exhausted(self.capacity));
        }

        self.used += 1;

        let Pool(pool) = T::pool_mut(self);
        let id = Id::new(pool.len());
        pool.push(node);

        Ok(id)
    }

    pub fn get<T: Node>(&self, id: Id<T>) -> &T {
        &T::pool(self).0[id.index()]
    }

    /// Cantidad total de nodos asignados.
    pub fn len(&self) -> usize {
        self.used
    }

    pub fn is_empty(&self) -> bool {
        self.used == 0
    }
}

impl<T: Node> Index<Id<T>> for Arena {
    type Output = T;

    fn index(&self, id: Id<T>) -> &T {
        self.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Block, Term};

    #[test]
    fn handles_are_per_pool() {
        let mut arena = Arena::default();
        let one = arena.alloc(Expr::Term(Term::Integer(1))).unwrap();
        let two = arena.alloc(Expr::Term(Term::Integer(2))).unwrap();
        let exit = arena.alloc(Statement::Exit(two)).unwrap();
        let chain = arena.alloc(ElseChain::Else(Block::default())).unwrap();

        assert_eq!((one.index(), two.index()), (0, 1));
        assert_eq!(exit.index(), 0);
        assert_eq!(chain.index(), 0);
        assert_eq!(arena.len(), 4);

        assert!(matches!(arena[one], Expr::Term(Term::Integer(1))));
        assert!(matches!(arena[exit], Statement::Exit(id) if id == two));
    }

    #[test]
    fn exhaustion_is_reported() {
        let mut arena = Arena::with_capacity(2);
        let expr = arena.alloc(Expr::Term(Term::Integer(0))).unwrap();
        arena.alloc(Statement::Exit(expr)).unwrap();

        assert_eq!(
            arena.alloc(Statement::Exit(expr)).unwrap_err(),
            ArenaError::Exhausted(2)
        );
    }
}
