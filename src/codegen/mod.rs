//! Generación de código.
//!
//! Recorre el AST ya validado y emite ensamblador NASM para x86-64 Linux
//! bajo una disciplina de máquina de pila: cada subexpresión deja
//! exactamente un valor en la pila y cada operador binario extrae dos y
//! coloca uno. Las variables viven en la misma pila; la posición de cada
//! una se registra como la altura de pila al momento de declararla, de
//! modo que una lectura se traduce a un desplazamiento relativo a `rsp`.
//!
//! El generador mantiene su propia [`ScopeTable`], independiente de la del
//! parser, ya que aquí la posición de una variable es la altura de pila y
//! no su ordinal de declaración.

use std::fmt::{self, Write};

use thiserror::Error;
use tracing::debug;

use crate::{
    arena::Arena,
    ast::{Ast, BinOp, Block, ChainId, ElseChain, Expr, ExprId, Statement, StmtId, Term},
    lex::Identifier,
    scope::{Duplicate, ScopeTable},
};

mod label;

use label::{Label, LabelKind, Labels};

/// Tamaño de cada valor en la pila, en bytes.
const VALUE_SIZE: usize = 8;

/// Inconsistencia del propio compilador.
///
/// Ninguno de estos errores puede ocurrir para un AST que pasó el
/// análisis sin diagnósticos.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum InternalError {
    #[error("internal compiler error: evaluation stack underflow")]
    StackUnderflow,

    #[error("internal compiler error: identifier `{0}` has no stack slot")]
    Unresolved(Identifier),

    #[error("internal compiler error: identifier `{0}` declared twice in one scope")]
    Redeclared(Identifier),

    #[error("internal compiler error: scope underflow")]
    ScopeUnderflow,

    #[error("internal compiler error: failed to format assembly")]
    Format(#[from] fmt::Error),
}

/// Traduce un programa completo a texto ensamblador.
pub fn generate(ast: &Ast) -> Result<String, InternalError> {
    let mut generator = Generator {
        arena: ast.arena(),
        height: 0,
        scope: ScopeTable::new(),
        labels: Labels::default(),
    };

    let mut output = String::new();
    writeln!(output, "global _start\n_start:")?;

    for &statement in &ast.program().statements {
        generator.statement(&mut output, statement)?;
    }

    // Salida implícita con código 0
    writeln!(output)?;
    emit!(output, "mov", "rdi, 0")?;

    writeln!(output, "\n_exit:")?;
    emit!(output, "mov", "rax, 60")?;
    emit!(output, "syscall")?;

    debug!(
        bytes = output.len(),
        globals = generator.scope.len(),
        "generated assembly"
    );

    Ok(output)
}

struct Generator<'a> {
    arena: &'a Arena,
    height: usize,
    scope: ScopeTable,
    labels: Labels,
}

impl<'a> Generator<'a> {
    fn statement(&mut self, out: &mut String, id: StmtId) -> Result<(), InternalError> {
        let arena = self.arena;
        match &arena[id] {
            Statement::Exit(status) => {
                self.expression(out, *status)?;
                self.pop(out, "rdi")?;
                emit!(out, "jmp", "_exit")?;
            }

            // El valor inicial queda en el tope y se convierte en la variable
            Statement::Declare { name, init } => {
                match init {
                    Some(init) => self.expression(out, *init)?,
                    None => self.reserve(out)?,
                }

                self.scope
                    .declare(name.val().clone(), self.height)
                    .map_err(|Duplicate(name)| InternalError::Redeclared(name))?;
            }

            // La dirección es la misma antes y después de evaluar el valor,
            // ya que `pop` calcula un operando relativo a `rsp` luego de
            // incrementarlo
            Statement::Assign { target, value } => {
                let address = self.address(target.val())?;
                self.expression(out, *value)?;
                self.pop(out, &address)?;
            }

            Statement::Block(block) => self.block(out, block)?,

            Statement::If {
                condition,
                body,
                chain,
            } => {
                let end = self.labels.next(LabelKind::EndIf);
                self.if_chain(out, *condition, body, *chain, end)?;
                writeln!(out, "{}:", end)?;
            }
        }

        Ok(())
    }

    /// Brazos de una cadena `if`, uno tras otro.
    ///
    /// El destino del salto condicional de cada brazo solo se conoce
    /// después de generar su cuerpo, por lo cual este se emite primero a
    /// un buffer aparte.
    fn if_chain(
        &mut self,
        out: &mut String,
        mut condition: ExprId,
        mut body: &'a Block,
        mut chain: Option<ChainId>,
        end: Label,
    ) -> Result<(), InternalError> {
        let arena = self.arena;

        loop {
            self.expression(out, condition)?;
            self.pop(out, "rax")?;
            emit!(out, "test", "rax, rax")?;

            let mut arm = String::new();
            self.block(&mut arm, body)?;
            emit!(arm, "jmp", "{}", end)?;

            let next = match chain {
                Some(next) => &arena[next],
                None => {
                    emit!(out, "jz", "{}", end)?;
                    out.push_str(&arm);
                    return Ok(());
                }
            };

            let skip = match next {
                ElseChain::Elif { .. } => self.labels.next(LabelKind::Elif),
                ElseChain::Else(_) => self.labels.next(LabelKind::Else),
            };

            emit!(out, "jz", "{}", skip)?;
            out.push_str(&arm);
            writeln!(out, "{}:", skip)?;

            match next {
                ElseChain::Elif {
                    condition: guard,
                    body: then,
                    next,
                } => {
                    condition = *guard;
                    body = then;
                    chain = *next;
                }

                ElseChain::Else(otherwise) => {
                    self.block(out, otherwise)?;
                    emit!(out, "jmp", "{}", end)?;
                    return Ok(());
                }
            }
        }
    }

    fn block(&mut self, out: &mut String, block: &Block) -> Result<(), InternalError> {
        self.scope.open_scope();
        for &statement in &block.statements {
            self.statement(out, statement)?;
        }

        // Se liberan exactamente las variables declaradas en este bloque
        let closed = self
            .scope
            .close_scope()
            .ok_or(InternalError::ScopeUnderflow)?;

        let count = closed.len();
        if count > 0 {
            self.height = self
                .height
                .checked_sub(count)
                .ok_or(InternalError::StackUnderflow)?;

            emit!(out, "add", "rsp, {}", count * VALUE_SIZE)?;
        }

        Ok(())
    }

    /// La espina izquierda de una cadena de operadores se recorre sin
    /// recursión: solo anidan los lados derechos y los paréntesis.
    fn expression(&mut self, out: &mut String, id: ExprId) -> Result<(), InternalError> {
        let arena = self.arena;

        let mut pending = Vec::new();
        let mut current = id;
        let leftmost = loop {
            match &arena[current] {
                Expr::Binary { op, left, right } => {
                    pending.push((*op, *right));
                    current = *left;
                }

                Expr::Term(term) => break term,
            }
        };

        match leftmost {
            Term::Integer(value) => {
                emit!(out, "mov", "rax, {}", value)?;
                self.push(out, "rax")?;
            }

            Term::Read(name) => {
                let address = self.address(name.val())?;
                self.push(out, &address)?;
            }

            Term::Paren(inner) => self.expression(out, *inner)?,
        }

        for (op, right) in pending.into_iter().rev() {
            self.expression(out, right)?;
            self.pop(out, "rbx")?;
            self.pop(out, "rax")?;

            let result = operate(out, op)?;
            self.push(out, result)?;
        }

        Ok(())
    }

    /// Operando de memoria para la variable visible con nombre `name`.
    fn address(&self, name: &Identifier) -> Result<String, InternalError> {
        let entry = self
            .scope
            .resolve(name)
            .ok_or_else(|| InternalError::Unresolved(name.clone()))?;

        let depth = self
            .height
            .checked_sub(entry.slot)
            .ok_or(InternalError::StackUnderflow)?;

        Ok(format!("QWORD [rsp + {}]", depth * VALUE_SIZE))
    }

    fn push(&mut self, out: &mut String, operand: &str) -> Result<(), InternalError> {
        emit!(out, "push", "{}", operand)?;
        self.height += 1;

        Ok(())
    }

    fn pop(&mut self, out: &mut String, operand: &str) -> Result<(), InternalError> {
        self.height = self
            .height
            .checked_sub(1)
            .ok_or(InternalError::StackUnderflow)?;

        emit!(out, "pop", "{}", operand)?;
        Ok(())
    }

    /// Aparta una posición sin inicializar.
    fn reserve(&mut self, out: &mut String) -> Result<(), InternalError> {
        emit!(out, "sub", "rsp, {}", VALUE_SIZE)?;
        self.height += 1;

        Ok(())
    }
}

/// Aplica `op` a `rax` (izquierda) y `rbx` (derecha). Retorna el registro
/// que contiene el resultado.
fn operate(out: &mut String, op: BinOp) -> Result<&'static str, fmt::Error> {
    use BinOp::*;

    match op {
        Add => emit!(out, "add", "rax, rbx")?,
        Sub => emit!(out, "sub", "rax, rbx")?,
        Mul => emit!(out, "imul", "rax, rbx")?,
        BitAnd => emit!(out, "and", "rax, rbx")?,
        BitOr => emit!(out, "or", "rax, rbx")?,
        BitXor => emit!(out, "xor", "rax, rbx")?,

        // División con signo de rdx:rax, cociente en rax y residuo en rdx
        Div | Mod => {
            emit!(out, "cqo")?;
            emit!(out, "idiv", "rbx")?;
        }
    }

    Ok(if op == Mod { "rdx" } else { "rax" })
}
