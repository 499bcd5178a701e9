//! Análisis sintáctico.
//!
//! Parser descendente recursivo con precedence climbing para expresiones.
//! Además de construir el AST dentro de un [`Arena`], el parser mantiene
//! una [`ScopeTable`] con la cual rechaza usos de identificadores no
//! declarados y redeclaraciones dentro de un mismo ámbito.
//!
//! # Recuperación de errores
//! Ningún error sintáctico o semántico detiene el análisis. Al encontrar
//! una sentencia mal formada se registra el diagnóstico específico y se
//! descartan tokens hasta encontrar uno que pueda iniciar una nueva
//! sentencia. Los bloques cierran su ámbito aun cuando contengan errores,
//! de modo que las profundidades de ámbito se mantienen balanceadas.
//!
//! Los únicos errores fatales son el agotamiento de la arena y un
//! anidamiento de bloques o paréntesis mayor a [`MAX_NESTING`] niveles.

use std::{
    fmt::{self, Display},
    rc::Rc,
};

use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    arena::{Arena, ArenaError},
    ast::{Ast, BinOp, Block, ChainId, ElseChain, Expr, ExprId, Program, Statement, StmtId, Term},
    error::{Classified, Diagnostics, ErrorKind},
    lex::{Identifier, Keyword, Token},
    scope::{Duplicate, ScopeTable},
    source::{Located, Location, Source},
};

/// Niveles máximos de bloques y paréntesis anidados.
pub const MAX_NESTING: usize = 128;

/// Condición que detiene el análisis por completo.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FatalError {
    #[error(transparent)]
    Arena(#[from] ArenaError),

    #[error("nesting too deep: more than {0} levels of blocks or parentheses")]
    TooDeep(usize),
}

/// Lo que se encontró en lugar de lo esperado.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Before {
    Token(Token),
    End,
}

impl Display for Before {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Before::Token(token) => write!(fmt, "before {}", token),
            Before::End => fmt.write_str("before the end of input"),
        }
    }
}

#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SyntaxError {
    #[error("expected {0} {1}")]
    Expected(Token, Before),

    #[error("expected an identifier {0}")]
    ExpectedId(Before),

    #[error("expected primary expression {0}")]
    ExpectedExpr(Before),

    #[error("expected `=` {0}")]
    ExpectedAssign(Before),

    #[error("no type declaration for identifier `{0}`, expected `int64` {1}")]
    ExpectedType(Identifier, Before),

    #[error("unexpected {0}, expected a statement")]
    UnexpectedToken(Token),
}

impl Classified for SyntaxError {
    const KIND: ErrorKind = ErrorKind::Syntax;
}

#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum SemanticError {
    #[error("identifier `{0}` not declared in this scope")]
    Undeclared(Identifier),

    #[error("multiple definitions of identifier `{0}`")]
    Redeclared(Identifier),
}

impl Classified for SemanticError {
    const KIND: ErrorKind = ErrorKind::Semantic;
}

/// Construye el AST de una unidad de compilación.
///
/// Los errores sintácticos y semánticos se acumulan en `diagnostics`. Solo
/// se propagan los errores fatales.
pub fn parse(
    source: &Rc<Source>,
    tokens: &[Located<Token>],
    arena: Arena,
    diagnostics: &mut Diagnostics,
) -> Result<Ast, FatalError> {
    let mut parser = Parser {
        tokens,
        cursor: 0,
        last_known: Location::start(source),
        depth: 0,
        arena,
        scope: ScopeTable::new(),
        diagnostics,
    };

    let statements = parser.statements(false)?;
    debug!(
        statements = statements.len(),
        nodes = parser.arena.len(),
        "parsed program"
    );

    Ok(Ast::new(parser.arena, Program { statements }))
}

struct Parser<'a, 'd> {
    tokens: &'a [Located<Token>],
    cursor: usize,
    last_known: Location,
    depth: usize,
    arena: Arena,
    scope: ScopeTable,
    diagnostics: &'d mut Diagnostics,
}

enum Failure {
    /// El diagnóstico ya fue registrado, se debe sincronizar.
    Recover,

    Fatal(FatalError),
}

impl From<FatalError> for Failure {
    fn from(error: FatalError) -> Self {
        Failure::Fatal(error)
    }
}

impl From<ArenaError> for Failure {
    fn from(error: ArenaError) -> Self {
        Failure::Fatal(error.into())
    }
}

type Parse<T> = Result<T, Failure>;

impl<'a> Parser<'a, '_> {
    /// Secuencia de sentencias hasta el final de la entrada o, si `nested`,
    /// hasta la `}` que cierra el bloque actual.
    fn statements(&mut self, nested: bool) -> Result<Vec<StmtId>, FatalError> {
        let mut statements = Vec::new();

        loop {
            match self.peek() {
                None => break,
                Some(Token::CloseCurly) if nested => break,
                _ => (),
            }

            let start = self.cursor;
            match self.statement() {
                Ok(Some(statement)) => statements.push(statement),
                Ok(None) => (),
                Err(Failure::Fatal(error)) => return Err(error),
                Err(Failure::Recover) => {
                    if self.cursor == start {
                        self.next();
                    }

                    self.synchronize();
                }
            }
        }

        Ok(statements)
    }

    fn statement(&mut self) -> Parse<Option<StmtId>> {
        let statement = match self.peek() {
            Some(Token::Keyword(Keyword::Exit)) => self.exit_statement()?,
            Some(Token::Keyword(Keyword::Mut)) => self.declaration()?,
            Some(Token::Keyword(Keyword::If)) => self.if_statement()?,
            Some(Token::Id(_)) => self.assignment()?,
            Some(Token::OpenCurly) => Statement::Block(self.block()?),

            // Sentencia vacía
            Some(Token::Semicolon) => {
                self.next();
                return Ok(None);
            }

            Some(token) => {
                let failure = self.fail(SyntaxError::UnexpectedToken(token.clone()));
                self.next();
                return failure;
            }

            None => return Ok(None),
        };

        Ok(Some(self.arena.alloc(statement)?))
    }

    fn exit_statement(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::Exit)?;
        self.expect(Token::OpenParen)?;

        // `exit()` equivale a `exit(0)`
        let status = if self.peek() == Some(&Token::CloseParen) {
            self.arena.alloc(Expr::Term(Term::Integer(0)))?
        } else {
            self.expression(1)?
        };

        self.expect(Token::CloseParen)?;
        self.expect(Token::Semicolon)?;

        Ok(Statement::Exit(status))
    }

    fn declaration(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::Mut)?;
        let name = self.id()?;

        // La variable se declara aunque el resto de la sentencia tenga
        // errores, pero después del inicializador: este no puede verla
        let init = self.declared_type(&name).and_then(|()| self.initializer());
        self.declare(&name);

        let init = init?;
        self.expect(Token::Semicolon)?;

        Ok(Statement::Declare { name, init })
    }

    fn declared_type(&mut self, name: &Located<Identifier>) -> Parse<()> {
        self.expect(Token::Colon)?;
        if self.eat(&Token::Keyword(Keyword::Int64)) {
            Ok(())
        } else {
            let before = self.before();
            self.fail(SyntaxError::ExpectedType(name.val().clone(), before))
        }
    }

    fn initializer(&mut self) -> Parse<Option<ExprId>> {
        if self.eat(&Token::Assign) {
            return Ok(Some(self.expression(1)?));
        }

        match self.peek() {
            Some(Token::Id(_)) | Some(Token::IntLiteral(_)) | Some(Token::OpenParen) => {
                let before = self.before();
                self.fail(SyntaxError::ExpectedAssign(before))
            }

            _ => Ok(None),
        }
    }

    fn assignment(&mut self) -> Parse<Statement> {
        let target = self.id()?;
        self.check_declared(&target);

        self.expect(Token::Assign)?;
        let value = self.expression(1)?;
        self.expect(Token::Semicolon)?;

        Ok(Statement::Assign { target, value })
    }

    fn if_statement(&mut self) -> Parse<Statement> {
        self.keyword(Keyword::If)?;
        let condition = self.condition()?;
        let body = self.block()?;
        let chain = self.else_chain()?;

        Ok(Statement::If {
            condition,
            body,
            chain,
        })
    }

    /// Los brazos se leen en orden y los nodos se enlazan de atrás hacia
    /// adelante, ya que cada `elif` apunta al siguiente.
    fn else_chain(&mut self) -> Parse<Option<ChainId>> {
        let mut arms = Vec::new();
        while self.eat(&Token::Keyword(Keyword::Elif)) {
            let condition = self.condition()?;
            let body = self.block()?;
            arms.push((condition, body));
        }

        let mut chain = None;
        if self.eat(&Token::Keyword(Keyword::Else)) {
            let body = self.block()?;
            chain = Some(self.arena.alloc(ElseChain::Else(body))?);
        }

        for (condition, body) in arms.into_iter().rev() {
            let elif = ElseChain::Elif {
                condition,
                body,
                next: chain,
            };

            chain = Some(self.arena.alloc(elif)?);
        }

        Ok(chain)
    }

    fn condition(&mut self) -> Parse<ExprId> {
        self.expect(Token::OpenParen)?;
        let condition = self.expression(1)?;
        self.expect(Token::CloseParen)?;

        Ok(condition)
    }

    fn block(&mut self) -> Parse<Block> {
        self.expect(Token::OpenCurly)?;

        let statements = self.nested(|parser| {
            parser.scope.open_scope();
            let statements = parser.statements(true);

            let closed = parser.scope.close_scope();
            debug_assert!(closed.is_some(), "block closed the global scope");

            Ok(statements?)
        })?;

        self.expect(Token::CloseCurly)?;
        Ok(Block { statements })
    }

    /// Precedence climbing: solo se consumen operadores cuyo poder de
    /// enlace sea al menos `min_precedence`. El lado derecho exige un
    /// poder estrictamente mayor, lo cual asocia a la izquierda.
    fn expression(&mut self, min_precedence: u8) -> Parse<ExprId> {
        let mut left = self.term()?;

        while let Some(op) = self.peek().and_then(BinOp::from_token) {
            if op.precedence() < min_precedence {
                break;
            }

            self.next();
            let right = self.expression(op.precedence() + 1)?;
            left = self.arena.alloc(Expr::Binary { op, left, right })?;
        }

        Ok(left)
    }

    fn term(&mut self) -> Parse<ExprId> {
        let term = match self.peek() {
            Some(Token::IntLiteral(value)) => {
                let value = *value;
                self.next();
                Term::Integer(value)
            }

            // Un identificador no declarado se reemplaza por un cero para
            // que el análisis continúe
            Some(Token::Id(_)) => {
                let id = self.id()?;
                if self.check_declared(&id) {
                    Term::Read(id)
                } else {
                    Term::Integer(0)
                }
            }

            Some(Token::OpenParen) => {
                self.next();
                let inner = self.nested(|parser| parser.expression(1))?;
                self.expect(Token::CloseParen)?;
                Term::Paren(inner)
            }

            _ => {
                let before = self.before();
                return self.fail(SyntaxError::ExpectedExpr(before));
            }
        };

        Ok(self.arena.alloc(Expr::Term(term))?)
    }

    /// Ejecuta `parse` un nivel de anidamiento más adentro.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> Parse<T>) -> Parse<T> {
        if self.depth >= MAX_NESTING {
            return Err(Failure::Fatal(FatalError::TooDeep(MAX_NESTING)));
        }

        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;

        result
    }

    fn declare(&mut self, name: &Located<Identifier>) {
        // Ordinal de declaración, solo para validar; el generador asigna
        // las posiciones reales en la pila
        let slot = self.scope.len() + 1;
        if let Err(Duplicate(id)) = self.scope.declare(name.val().clone(), slot) {
            self.report(SemanticError::Redeclared(id), name.location().clone());
        }
    }

    fn check_declared(&mut self, id: &Located<Identifier>) -> bool {
        let declared = self.scope.resolve(id.val()).is_some();
        if !declared {
            self.report(
                SemanticError::Undeclared(id.val().clone()),
                id.location().clone(),
            );
        }

        declared
    }

    /// Descarta tokens hasta uno que pueda iniciar una sentencia.
    fn synchronize(&mut self) {
        while let Some(token) = self.peek() {
            if starts_statement(token) {
                break;
            }

            trace!(%token, "skipped");
            self.next();
        }
    }

    fn id(&mut self) -> Parse<Located<Identifier>> {
        if let Some(Token::Id(id)) = self.peek() {
            self.next();
            return Ok(Located::at(id.clone(), self.last_known.clone()));
        }

        let before = self.before();
        self.fail(SyntaxError::ExpectedId(before))
    }

    fn keyword(&mut self, keyword: Keyword) -> Parse<()> {
        self.expect(Token::Keyword(keyword))
    }

    fn expect(&mut self, token: Token) -> Parse<()> {
        if self.eat(&token) {
            Ok(())
        } else {
            let before = self.before();
            self.fail(SyntaxError::Expected(token, before))
        }
    }

    fn eat(&mut self, token: &Token) -> bool {
        let matches = self.peek() == Some(token);
        if matches {
            self.next();
        }

        matches
    }

    fn peek(&self) -> Option<&'a Token> {
        self.tokens.get(self.cursor).map(Located::val)
    }

    fn next(&mut self) -> Option<&'a Located<Token>> {
        let token = self.tokens.get(self.cursor)?;
        self.cursor += 1;
        self.last_known = token.location().clone();

        Some(token)
    }

    fn before(&self) -> Before {
        match self.peek() {
            Some(token) => Before::Token(token.clone()),
            None => Before::End,
        }
    }

    /// Ubicación del siguiente token o, al final, la del último consumido.
    fn here(&self) -> Location {
        match self.tokens.get(self.cursor) {
            Some(token) => token.location().clone(),
            None => self.last_known.clone(),
        }
    }

    fn report<E: 'static + Classified>(&mut self, error: E, location: Location) {
        self.diagnostics.push(Located::at(error, location));
    }

    fn fail<T>(&mut self, error: SyntaxError) -> Parse<T> {
        let here = self.here();
        self.report(error, here);
        Err(Failure::Recover)
    }
}

/// Conjunto de sincronización para recuperación de errores.
fn starts_statement(token: &Token) -> bool {
    use Keyword::*;

    matches!(
        token,
        Token::Keyword(If | Elif | Else | Mut | Exit)
            | Token::Id(_)
            | Token::Semicolon
            | Token::OpenCurly
            | Token::CloseCurly
    )
}
