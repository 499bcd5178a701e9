/// Emite una instrucción con su mnemónico alineado a ocho columnas.
///
/// Requiere `std::fmt::Write` en ámbito; el resultado es un `fmt::Result`.
macro_rules! emit {
    ($output:expr, $opcode:expr) => {
        writeln!($output, "\t{}", $opcode)
    };

    ($output:expr, $opcode:expr, $($format:tt)*) => {{
        write!($output, "\t{:8}", $opcode)?;
        writeln!($output, $($format)*)
    }};
}
