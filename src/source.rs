//! Rastreo de ubicaciones originales en código fuente.
//!
//! Los distintos objetos internos que el compilador construye
//! deben llevar cuenta de la posición en el código fuente original
//! donde se originaron, lo cual permite señalar el punto exacto
//! en donde ocurre un error. Las ubicaciones se imprimen con la
//! forma `<archivo>::<línea>:<columna>`.

use std::{
    fmt::{self, Debug, Display, Formatter},
    rc::Rc,
};

/// Un objeto cualquiera con una posición original asociada.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<T> {
    location: Location,
    value: T,
}

impl<T> Located<T> {
    /// Obtiene el valor.
    pub fn val(&self) -> &T {
        &self.value
    }

    /// Obtiene la ubicación.
    pub fn location(&self) -> &Location {
        &self.location
    }

    /// Descarta la ubicación y toma ownership del valor.
    pub fn into_inner(self) -> T {
        self.value
    }

    /// Construye a partir de un valor y una ubicación.
    pub fn at(value: T, location: Location) -> Self {
        Located { value, location }
    }
}

impl<T> AsRef<T> for Located<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}

/// Una unidad de compilación: nombre de origen y texto completo.
#[derive(Debug, PartialEq, Eq)]
pub struct Source {
    name: String,
    text: String,
}

impl Source {
    /// Construye una unidad de compilación compartida.
    pub fn new<N, T>(name: N, text: T) -> Rc<Self>
    where
        N: Into<String>,
        T: Into<String>,
    {
        Rc::new(Source {
            name: name.into(),
            text: text.into(),
        })
    }

    /// Nombre del origen, usado únicamente en diagnósticos.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Texto fuente.
    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Una ubicación está conformada por un origen y una posición.
#[derive(Clone, PartialEq, Eq)]
pub struct Location {
    from: Rc<Source>,
    position: Position,
}

impl Location {
    /// Construye una ubicación dentro de un origen.
    pub fn new(from: &Rc<Source>, position: Position) -> Self {
        Location {
            from: Rc::clone(from),
            position,
        }
    }

    /// Ubicación del primer carácter de un origen.
    pub fn start(from: &Rc<Source>) -> Self {
        Location::new(from, Position::default())
    }

    /// Obtiene la posición.
    pub fn position(&self) -> Position {
        self.position
    }

    /// Obtiene el origen.
    pub fn source(&self) -> &Rc<Source> {
        &self.from
    }
}

impl Display for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}::{}", self.from.name, self.position)
    }
}

impl Debug for Location {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, formatter)
    }
}

/// Una posición línea-columna en un archivo.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Position {
    line: u32,
    column: u32,
}

impl Position {
    /// Construye una posición. Ambas coordenadas comienzan en 1.
    pub fn new(line: u32, column: u32) -> Self {
        Position { line, column }
    }

    /// Obtiene el número de línea.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Obtiene el número de columna.
    pub fn column(&self) -> u32 {
        self.column
    }

    /// Incrementa el número de columna.
    pub fn advance(self) -> Position {
        Position {
            line: self.line,
            column: self.column + 1,
        }
    }

    /// Incrementa el número de línea y retorna a la columna 1.
    pub fn newline(self) -> Position {
        Position {
            line: self.line + 1,
            column: 1,
        }
    }

    /// Posición que sigue a haber consumido `c`.
    pub fn after(self, c: char) -> Position {
        match c {
            '\n' => self.newline(),
            _ => self.advance(),
        }
    }
}

impl Default for Position {
    fn default() -> Self {
        Position { line: 1, column: 1 }
    }
}

impl Display for Position {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_follow_newlines() {
        let position = "ab\nc"
            .chars()
            .fold(Position::default(), Position::after);

        assert_eq!(position, Position::new(2, 2));
    }

    #[test]
    fn location_uses_double_colon_after_file_name() {
        let source = Source::new("main.crm", "");
        let location = Location::new(&source, Position::new(3, 14));

        assert_eq!(location.to_string(), "main.crm::3:14");
    }
}
