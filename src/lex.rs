//! Análisis léxico.
//!
//! # Tokenization
//! Esta es la primera fase del compilador. Descompone el texto de un
//! [`Source`] en unidades léxicas denominadas tokens. Los espacios
//! en blanco y los comentarios se descartan durante esta operación. Cada
//! token emitido está asociado a la ubicación de su primer carácter en el
//! código fuente original, lo cual permite rastrear errores tanto en los
//! tokens mismos como en constructos más elevados de fases posteriores.
//!
//! # Contenido de un token
//! Operadores, puntuación y palabras clave se identifican por el hecho de
//! lo que son y no incluyen lexemas. Los identificadores sí incluyen su
//! lexema original. Las constantes literales se resuelven a sus valores.
//!
//! # Reglas importantes del lenguaje
//! - Los identificadores tienen la forma `[A-Za-z][A-Za-z0-9]*`.
//! - El lenguaje distingue mayúsculas de minúsculas.
//! - No existen operadores unarios, por lo cual `-1` son dos tokens.
//! - Hay comentarios de línea (`//`) y de bloque (`/* */`).
//!
//! # Errores
//! El lexer se recupera de caracteres desconocidos descartándolos, por lo
//! cual una misma ejecución puede reportar varios errores léxicos. Los
//! errores se acumulan en [`Diagnostics`] y el flujo de tokens continúa.

use crate::{
    error::{Classified, Diagnostics, ErrorKind},
    source::{Located, Location, Position, Source},
};

use std::{
    fmt::{self, Display},
    iter::Peekable,
    rc::Rc,
    str::{Chars, FromStr},
};

use thiserror::Error;
use tracing::debug;

/// Error de escaneo.
#[non_exhaustive]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum LexerError {
    /// Carácter desconocido o inesperado en el flujo de entrada.
    #[error("invalid token {0:?}")]
    BadChar(char),

    /// Un comentario de bloque llegó al final de la entrada.
    #[error("unterminated comment, `/*` is never closed")]
    UnterminatedComment,

    /// Una constante entera se encuentra fuera de rango.
    #[error("integer literal overflow, valid range is [0, {}]", i64::MAX)]
    IntOverflow,
}

impl Classified for LexerError {
    const KIND: ErrorKind = ErrorKind::Lexical;
}

/// Un identificador.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(Rc<str>);

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Identifier {
    fn from(name: &str) -> Self {
        Identifier(Rc::from(name))
    }
}

impl Display for Identifier {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(fmt)
    }
}

/// Objeto resultante del análisis léxico.
///
/// Un token contiene suficiente información para describir completamente
/// a una entidad léxica en el programa fuente.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Identificador.
    Id(Identifier),

    /// Palabra clave.
    Keyword(Keyword),

    /// Literal de entero.
    IntLiteral(i64),

    /// `=`
    Assign,

    /// `+`
    Plus,

    /// `-`
    Minus,

    /// `*`
    Times,

    /// `/`
    Slash,

    /// `%`
    Percent,

    /// `&`
    Ampersand,

    /// `|`
    Pipe,

    /// `^`
    Caret,

    /// `~`
    Tilde,

    /// `\`
    Backslash,

    /// `:`
    Colon,

    /// `;`
    Semicolon,

    /// `(`
    OpenParen,

    /// `)`
    CloseParen,

    /// `{`
    OpenCurly,

    /// `}`
    CloseCurly,

    /// `[`
    OpenSquare,

    /// `]`
    CloseSquare,
}

impl Display for Token {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Token::*;

        match self {
            Id(id) => write!(fmt, "identifier `{}`", id),
            Keyword(keyword) => write!(fmt, "keyword `{}`", keyword),
            IntLiteral(integer) => write!(fmt, "literal `{}`", integer),
            Assign => fmt.write_str("`=`"),
            Plus => fmt.write_str("`+`"),
            Minus => fmt.write_str("`-`"),
            Times => fmt.write_str("`*`"),
            Slash => fmt.write_str("`/`"),
            Percent => fmt.write_str("`%`"),
            Ampersand => fmt.write_str("`&`"),
            Pipe => fmt.write_str("`|`"),
            Caret => fmt.write_str("`^`"),
            Tilde => fmt.write_str("`~`"),
            Backslash => fmt.write_str("`\\`"),
            Colon => fmt.write_str("`:`"),
            Semicolon => fmt.write_str("`;`"),
            OpenParen => fmt.write_str("`(`"),
            CloseParen => fmt.write_str("`)`"),
            OpenCurly => fmt.write_str("`{`"),
            CloseCurly => fmt.write_str("`}`"),
            OpenSquare => fmt.write_str("`[`"),
            CloseSquare => fmt.write_str("`]`"),
        }
    }
}

/// Una palabra clave.
///
/// Algunas palabras están reservadas sin que exista todavía una
/// producción sintáctica que las acepte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Keyword {
    Exit,
    Mut,
    Const,
    Int16,
    Int32,
    Int64,
    Bool,
    True,
    False,
    If,
    Elif,
    Else,
    While,
    For,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("exit",  Keyword::Exit),
    ("mut",   Keyword::Mut),
    ("const", Keyword::Const),
    ("int16", Keyword::Int16),
    ("int32", Keyword::Int32),
    ("int64", Keyword::Int64),
    ("bool",  Keyword::Bool),
    ("true",  Keyword::True),
    ("false", Keyword::False),
    ("if",    Keyword::If),
    ("elif",  Keyword::Elif),
    ("else",  Keyword::Else),
    ("while", Keyword::While),
    ("for",   Keyword::For),
];

impl Display for Keyword {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = KEYWORDS
            .iter()
            .find(|&&(_, keyword)| keyword == *self)
            .map(|&(name, _)| name)
            .unwrap_or("?");

        fmt.write_str(name)
    }
}

impl FromStr for Keyword {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        KEYWORDS
            .iter()
            .find(|&&(name, _)| name == string)
            .map(|&(_, keyword)| keyword)
            .ok_or(())
    }
}

/// Descompone una unidad de compilación completa en tokens.
///
/// Los errores léxicos se registran en `diagnostics` y no interrumpen
/// el escaneo, por lo cual el resultado siempre es el flujo de todos los
/// tokens válidos que se lograron reconocer.
pub fn tokenize(source: &Rc<Source>, diagnostics: &mut Diagnostics) -> Vec<Located<Token>> {
    let mut tokens = Vec::new();
    for result in Lexer::new(source, source.text()) {
        match result {
            Ok(token) => tokens.push(token),
            Err(error) => diagnostics.push(error),
        }
    }

    debug!(tokens = tokens.len(), "lexed {}", source.name());
    tokens
}

/// Máquina de estados para análisis léxico.
///
/// Un lexer puede encontrarse en uno de diversos estados. La
/// salida del lexer, así como su siguiente estado, se define
/// a partir de tanto su estado actual como el siguiente carácter
/// encontrado en el flujo de entrada.
pub struct Lexer<'a> {
    from: Rc<Source>,
    chars: Peekable<Chars<'a>>,
    state: State,
    start: Position,
    next: Position,
}

/// Posibles estados del lexer.
enum State {
    /// Estado que ocurre antes de encontrar el inicio de un token.
    Start,

    /// Estado de completitud; siempre emite el token incluido,
    /// consume la entrada actual y pasa a [`State::Start`].
    Complete(Token),

    /// Se encontró `/`.
    ///
    /// Puede tratarse de una división o del inicio de un comentario.
    Slash,

    /// Comentario de línea.
    ///
    /// Este estado vuelve a [`State::Start`] al encontrar `'\n'`.
    LineComment,

    /// Comentario de bloque iniciado en `opened`.
    ///
    /// `star` indica si el último carácter fue `*`.
    BlockComment { opened: Position, star: bool },

    /// Constante entera, `None` si ya desbordó.
    ///
    /// Este estado incluirá dígitos en el token mientras que
    /// el siguiente carácter sea un dígito.
    Integer(Option<i64>),

    /// Término que puede ser un identificador o una palabra clave.
    Word(String),
}

impl<'a> Lexer<'a> {
    /// Crea un lexer en estado inicial a partir de un texto.
    pub fn new(from: &Rc<Source>, text: &'a str) -> Self {
        Lexer {
            from: Rc::clone(from),
            chars: text.chars().peekable(),
            state: State::Start,
            start: Position::default(),
            next: Position::default(),
        }
    }

    /// Intenta construir un siguiente token.
    fn lex(&mut self) -> Result<Option<Token>, Located<LexerError>> {
        use {State::*, Token::*};

        loop {
            let next_char = self.chars.peek().copied();

            // La posición de origen se mueve junto a la posición
            // siguiente siempre que no se haya encontrado una
            // frontera de token
            if let Start = self.state {
                self.start = self.next;
            }

            // Switch table principal, determina cambios de estado
            // y de salida del lexer a partir de combinaciones del
            // estado actual y el siguiente carácter
            match (&mut self.state, next_char) {
                // Tokens triviales
                (Start, None) => return Ok(None),
                (Start, Some('=')) => self.state = Complete(Assign),
                (Start, Some('+')) => self.state = Complete(Plus),
                (Start, Some('-')) => self.state = Complete(Minus),
                (Start, Some('*')) => self.state = Complete(Times),
                (Start, Some('%')) => self.state = Complete(Percent),
                (Start, Some('&')) => self.state = Complete(Ampersand),
                (Start, Some('|')) => self.state = Complete(Pipe),
                (Start, Some('^')) => self.state = Complete(Caret),
                (Start, Some('~')) => self.state = Complete(Tilde),
                (Start, Some('\\')) => self.state = Complete(Backslash),
                (Start, Some(':')) => self.state = Complete(Colon),
                (Start, Some(';')) => self.state = Complete(Semicolon),
                (Start, Some('(')) => self.state = Complete(OpenParen),
                (Start, Some(')')) => self.state = Complete(CloseParen),
                (Start, Some('{')) => self.state = Complete(OpenCurly),
                (Start, Some('}')) => self.state = Complete(CloseCurly),
                (Start, Some('[')) => self.state = Complete(OpenSquare),
                (Start, Some(']')) => self.state = Complete(CloseSquare),
                (Start, Some('/')) => self.state = State::Slash,

                // Identificadores y palabras clave
                (Start, Some(c)) if c.is_ascii_alphabetic() => self.state = Word(c.to_string()),

                // Inicio de una constante numérica. No se consume el
                // dígito, ya que esta lógica ya está implementada en
                // el caso de estado de constante entera.
                (Start, Some(c)) if c.is_ascii_digit() => {
                    self.state = Integer(Some(0));
                    continue;
                }

                // Espacios en blanco y caracteres inesperados. Estos
                // últimos se descartan para continuar el escaneo.
                (Start, Some(c)) if c.is_ascii_whitespace() => (),
                (Start, Some(c)) => {
                    self.bump();
                    return Err(self.fail(LexerError::BadChar(c), self.start));
                }

                // Emisión retardada de tokens cualesquiera
                (Complete(token), _) => return Ok(Some(std::mem::replace(token, Semicolon))),

                // `//` y `/*` inician comentarios, de lo contrario es una división
                (State::Slash, Some('/')) => self.state = LineComment,
                (State::Slash, Some('*')) => {
                    self.state = BlockComment {
                        opened: self.start,
                        star: false,
                    }
                }

                (State::Slash, _) => return Ok(Some(Token::Slash)),

                // Los comentarios de línea descartan el resto de la línea
                (LineComment, Some('\n')) | (LineComment, None) => self.state = Start,
                (LineComment, Some(_)) => (),

                // Comentarios de bloque, posiblemente multilínea
                (BlockComment { star: true, .. }, Some('/')) => self.state = Start,
                (BlockComment { star, .. }, Some(c)) => *star = c == '*',
                (BlockComment { opened, .. }, None) => {
                    let opened = *opened;
                    self.state = Start;
                    return Err(self.fail(LexerError::UnterminatedComment, opened));
                }

                // Acumulación dígito por dígito de constantes enteras
                (Integer(accumulated), Some(digit)) if digit.is_ascii_digit() => {
                    let digit = i64::from(digit as u8 - b'0');
                    *accumulated = accumulated
                        .and_then(|n| n.checked_mul(10))
                        .and_then(|n| n.checked_add(digit));
                }

                // Si sigue algo que no es un dígito, la constante ha terminado
                (Integer(Some(integer)), _) => return Ok(Some(IntLiteral(*integer))),
                (Integer(None), _) => return Err(self.fail(LexerError::IntOverflow, self.start)),

                // Extensión de términos
                (Word(word), Some(c)) if c.is_ascii_alphanumeric() => word.push(c),

                // Si sigue algo que no puede formar parte del término, ha terminado
                (Word(word), _) => {
                    let token = match self::Keyword::from_str(word) {
                        Ok(keyword) => Keyword(keyword),
                        Err(()) => Id(Identifier::from(word.as_str())),
                    };

                    return Ok(Some(token));
                }
            }

            // Si no hubo `continue` ni `return`, aquí se consume el
            // carácter que se observó con lookahead anteriormente
            self.bump();
        }
    }

    /// Consume el carácter de lookahead, actualizando la posición.
    fn bump(&mut self) {
        if let Some(c) = self.chars.next() {
            self.next = self.next.after(c);
        }
    }

    fn fail(&self, error: LexerError, at: Position) -> Located<LexerError> {
        Located::at(error, Location::new(&self.from, at))
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Located<Token>, Located<LexerError>>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.lex();
        self.state = State::Start;

        match result {
            Ok(None) => None,
            Ok(Some(token)) => {
                let location = Location::new(&self.from, self.start);
                Some(Ok(Located::at(token, location)))
            }

            Err(error) => Some(Err(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lex(text: &str) -> (Vec<Located<Token>>, Diagnostics) {
        let source = Source::new("test.crm", text);
        let mut diagnostics = Diagnostics::default();
        let tokens = tokenize(&source, &mut diagnostics);
        (tokens, diagnostics)
    }

    fn kinds(text: &str) -> Vec<Token> {
        let (tokens, diagnostics) = lex(text);
        assert!(diagnostics.is_empty(), "{}", diagnostics);
        tokens.into_iter().map(Located::into_inner).collect()
    }

    fn positions(text: &str) -> Vec<(u32, u32)> {
        lex(text)
            .0
            .iter()
            .map(|token| {
                let position = token.location().position();
                (position.line(), position.column())
            })
            .collect()
    }

    #[test]
    fn declaration() {
        use Token::*;

        assert_eq!(
            kinds("mut x1: int64 = 42;"),
            vec![
                Keyword(self::Keyword::Mut),
                Id(Identifier::from("x1")),
                Colon,
                Keyword(self::Keyword::Int64),
                Assign,
                IntLiteral(42),
                Semicolon,
            ]
        );
    }

    #[test]
    fn keywords_are_case_sensitive() {
        assert_eq!(
            kinds("exit Exit elif"),
            vec![
                Token::Keyword(Keyword::Exit),
                Token::Id(Identifier::from("Exit")),
                Token::Keyword(Keyword::Elif),
            ]
        );
    }

    #[test]
    fn operators() {
        use Token::*;

        assert_eq!(
            kinds("+-*/%&|^~\\[]"),
            vec![
                Plus, Minus, Times, Slash, Percent, Ampersand, Pipe, Caret, Tilde, Backslash,
                OpenSquare, CloseSquare,
            ]
        );
    }

    #[test]
    fn no_unary_minus() {
        assert_eq!(kinds("-7"), vec![Token::Minus, Token::IntLiteral(7)]);
    }

    #[test]
    fn tokens_carry_first_character_position() {
        assert_eq!(
            positions("exit(12);\n  x = y;"),
            vec![(1, 1), (1, 5), (1, 6), (1, 8), (1, 9), (2, 3), (2, 5), (2, 7), (2, 8)]
        );
    }

    #[test]
    fn comments_are_elided() {
        let text = "a // line comment\n/* block\n comment */ b / c";
        assert_eq!(
            kinds(text),
            vec![
                Token::Id(Identifier::from("a")),
                Token::Id(Identifier::from("b")),
                Token::Slash,
                Token::Id(Identifier::from("c")),
            ]
        );

        assert_eq!(positions(text), vec![(1, 1), (3, 13), (3, 15), (3, 17)]);
    }

    #[test]
    fn block_comment_closes_after_repeated_stars() {
        assert_eq!(kinds("/* ** **/ 1"), vec![Token::IntLiteral(1)]);
    }

    #[test]
    fn unterminated_block_comment() {
        let (tokens, diagnostics) = lex("x /* never\nclosed");

        assert_eq!(tokens.len(), 1);
        assert_eq!(diagnostics.count(ErrorKind::Lexical), 1);
        assert_eq!(
            diagnostics.to_string(),
            "test.crm::1:3: lexical error: unterminated comment, `/*` is never closed\n"
        );
    }

    #[test]
    fn bad_characters_are_skipped() {
        let (tokens, diagnostics) = lex("x $ = @ 1;");
        let tokens: Vec<_> = tokens.into_iter().map(Located::into_inner).collect();

        assert_eq!(
            tokens,
            vec![
                Token::Id(Identifier::from("x")),
                Token::Assign,
                Token::IntLiteral(1),
                Token::Semicolon,
            ]
        );

        assert_eq!(diagnostics.len(), 2);
        assert_eq!(
            diagnostics.to_string(),
            "test.crm::1:3: lexical error: invalid token '$'\n\
             test.crm::1:7: lexical error: invalid token '@'\n"
        );
    }

    #[test]
    fn integer_overflow() {
        let (tokens, diagnostics) = lex("9223372036854775807 9223372036854775808;");

        assert_eq!(tokens[0].val(), &Token::IntLiteral(i64::MAX));
        assert_eq!(tokens[1].val(), &Token::Semicolon);
        assert_eq!(diagnostics.count(ErrorKind::Lexical), 1);
    }
}
