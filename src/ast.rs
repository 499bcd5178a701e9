//! Árbol de sintaxis abstracta.
//!
//! Todos los nodos viven en un [`Arena`] y se refieren entre sí mediante
//! handles ([`ExprId`], [`StmtId`], [`ChainId`]), nunca mediante punteros.
//! El árbol completo se libera de una sola vez junto con su arena.

use crate::{
    arena::{Arena, Id},
    lex::{Identifier, Token},
    source::Located,
};

pub type ExprId = Id<Expr>;
pub type StmtId = Id<Statement>;
pub type ChainId = Id<ElseChain>;

/// Resultado del análisis sintáctico: la arena y el programa que contiene.
#[derive(Debug)]
pub struct Ast {
    arena: Arena,
    program: Program,
}

impl Ast {
    pub fn new(arena: Arena, program: Program) -> Self {
        Ast { arena, program }
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn program(&self) -> &Program {
        &self.program
    }
}

/// Lista ordenada de sentencias de nivel superior.
#[derive(Debug, Default)]
pub struct Program {
    pub statements: Vec<StmtId>,
}

#[derive(Debug, Default)]
pub struct Block {
    pub statements: Vec<StmtId>,
}

#[derive(Debug)]
pub enum Statement {
    /// `exit(expr);`
    Exit(ExprId),

    /// `mut name: int64 [= init];`
    Declare {
        name: Located<Identifier>,
        init: Option<ExprId>,
    },

    /// `name = value;`
    Assign {
        target: Located<Identifier>,
        value: ExprId,
    },

    /// `{ ... }`
    Block(Block),

    /// `if (condition) { body } [chain]`
    If {
        condition: ExprId,
        body: Block,
        chain: Option<ChainId>,
    },
}

/// Cola de un `if`: cero o más `elif` y un `else` opcional.
#[derive(Debug)]
pub enum ElseChain {
    Elif {
        condition: ExprId,
        body: Block,
        next: Option<ChainId>,
    },

    Else(Block),
}

#[derive(Debug)]
pub enum Expr {
    Term(Term),
    Binary { op: BinOp, left: ExprId, right: ExprId },
}

#[derive(Debug)]
pub enum Term {
    Integer(i64),
    Read(Located<Identifier>),
    Paren(ExprId),
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinOp {
    /// Operador binario que corresponde a un token, si lo hay.
    pub fn from_token(token: &Token) -> Option<Self> {
        let op = match token {
            Token::Plus => BinOp::Add,
            Token::Minus => BinOp::Sub,
            Token::Times => BinOp::Mul,
            Token::Slash => BinOp::Div,
            Token::Percent => BinOp::Mod,
            Token::Ampersand => BinOp::BitAnd,
            Token::Pipe => BinOp::BitOr,
            Token::Caret => BinOp::BitXor,
            _ => return None,
        };

        Some(op)
    }

    /// Poder de enlace, de menor a mayor: `|` < `^` < `&` < `+ -` < `* / %`.
    pub fn precedence(self) -> u8 {
        use BinOp::*;

        match self {
            BitOr => 1,
            BitXor => 2,
            BitAnd => 3,
            Add | Sub => 4,
            Mul | Div | Mod => 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplicative_binds_tightest() {
        let ops = [
            BinOp::BitOr,
            BinOp::BitXor,
            BinOp::BitAnd,
            BinOp::Add,
            BinOp::Mul,
        ];

        assert!(ops.windows(2).all(|pair| pair[0].precedence() < pair[1].precedence()));
        assert_eq!(BinOp::Sub.precedence(), BinOp::Add.precedence());
        assert_eq!(BinOp::Mod.precedence(), BinOp::Div.precedence());
    }

    #[test]
    fn only_binary_operators_map() {
        assert_eq!(BinOp::from_token(&Token::Percent), Some(BinOp::Mod));
        assert_eq!(BinOp::from_token(&Token::Tilde), None);
        assert_eq!(BinOp::from_token(&Token::Assign), None);
    }
}
