use cer::{
    arena::ArenaError,
    error::{Diagnostics, ErrorKind},
    parse::{FatalError, MAX_NESTING},
    source::Source,
    CompileError, CompileOptions,
};

use pretty_assertions::assert_eq;

fn compile(text: &str) -> Result<String, CompileError> {
    let source = Source::new("prog.crm", text);
    cer::compile(&source, &CompileOptions::default())
}

fn rejected(text: &str) -> Diagnostics {
    match compile(text) {
        Err(CompileError::Rejected(diagnostics)) => diagnostics,
        Ok(asm) => panic!("compiled successfully:\n{}", asm),
        Err(error) => panic!("unexpected failure: {}", error),
    }
}

fn instructions(asm: &str) -> Vec<String> {
    asm.lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect()
}

fn count(asm: &str, line: &str) -> usize {
    instructions(asm).iter().filter(|&l| l == line).count()
}

#[test]
fn precedence_multiplies_before_adding() {
    let asm = compile("exit(1 + 2 * 3);").unwrap();
    let lines = instructions(&asm);

    let position = |needle: &str| lines.iter().position(|line| line == needle).unwrap();
    assert!(position("imul rax, rbx") < position("add rax, rbx"));
    assert!(position("mov rax, 3") < position("imul rax, rbx"));
}

#[test]
fn shadowing_reads_inner_then_outer() {
    let asm = compile(
        "mut x: int64 = 1;\n\
         {\n\
             mut x: int64 = 2;\n\
             exit(x);\n\
         }\n\
         exit(x);",
    )
    .unwrap();

    // Ambas lecturas encuentran a su propia `x` en el tope de la pila
    let lines = instructions(&asm);
    let reads: Vec<_> = lines
        .iter()
        .filter(|line| line.starts_with("push QWORD"))
        .collect();

    assert_eq!(reads, ["push QWORD [rsp + 0]", "push QWORD [rsp + 0]"]);
    assert_eq!(count(&asm, "add rsp, 8"), 1);
}

#[test]
fn duplicate_declaration_is_one_error() {
    let diagnostics = rejected("mut x: int64 = 1; mut x: int64 = 2;");

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics.count(ErrorKind::Semantic), 1);
}

#[test]
fn undeclared_identifier_blocks_generation() {
    let diagnostics = rejected("exit(y);");

    assert_eq!(
        diagnostics.to_string(),
        "prog.crm::1:6: semantic error: identifier `y` not declared in this scope\n"
    );
}

#[test]
fn errors_from_every_phase_accumulate() {
    let diagnostics = rejected("mut a: int64 = 1 $;\nexit(a)");

    assert_eq!(
        diagnostics.to_string(),
        "prog.crm::1:18: lexical error: invalid token '$'\n\
         prog.crm::2:7: syntax error: expected `;` before the end of input\n"
    );
}

#[test]
fn rejection_summary() {
    let error = compile("exit(a); exit(b);").unwrap_err();
    assert_eq!(error.to_string(), "aborting due to 2 previous error(s)");
}

#[test]
fn teardown_matches_declarations_per_block() {
    let asm = compile(
        "mut g: int64 = 0;\n\
         {\n\
             mut a: int64 = 1;\n\
             mut b: int64;\n\
             {\n\
                 mut c: int64 = a + b;\n\
             }\n\
             g = a;\n\
         }\n\
         exit(g);",
    )
    .unwrap();

    let teardowns: Vec<_> = instructions(&asm)
        .into_iter()
        .filter(|line| line.starts_with("add rsp"))
        .collect();

    assert_eq!(teardowns, ["add rsp, 8", "add rsp, 16"]);
}

#[test]
fn if_elif_else_uses_three_labels() {
    let asm = compile(
        "mut n: int64 = 3;\n\
         if (n - 1) {\n\
             exit(1);\n\
         } elif (n - 2) {\n\
             exit(2);\n\
         } else {\n\
             exit(3);\n\
         }",
    )
    .unwrap();

    let definitions: Vec<_> = instructions(&asm)
        .into_iter()
        .filter(|line| line.ends_with(':') && line.starts_with('_'))
        .filter(|line| line != "_start:" && line != "_exit:")
        .collect();

    assert_eq!(
        definitions,
        ["_elif_label_0:", "_else_label_0:", "_end_if_label_0:"]
    );

    // Cada brazo llega al final exactamente una vez
    assert_eq!(count(&asm, "jmp _end_if_label_0"), 3);
    assert_eq!(count(&asm, "jz _elif_label_0"), 1);
    assert_eq!(count(&asm, "jz _else_label_0"), 1);
}

#[test]
fn nested_ifs_get_distinct_labels() {
    let asm = compile("if (1) { if (0) { exit(4); } } exit(0);").unwrap();

    assert_eq!(count(&asm, "_end_if_label_0:"), 1);
    assert_eq!(count(&asm, "_end_if_label_1:"), 1);

    // El `if` interno cierra antes que el externo
    let lines = instructions(&asm);
    let inner = lines.iter().position(|l| l == "_end_if_label_1:").unwrap();
    let outer = lines.iter().position(|l| l == "_end_if_label_0:").unwrap();
    assert!(inner < outer);
}

#[test]
fn output_is_deterministic() {
    let text = "mut a: int64 = 10;\n\
                if (a % 2) { a = a / 2; } elif (a & 1) { a = a | 4; } else { a = a ^ 3; }\n\
                exit(a);";

    assert_eq!(compile(text).unwrap(), compile(text).unwrap());
}

#[test]
fn comments_and_empty_statements_are_ignored() {
    let plain = compile("exit(5);").unwrap();
    let noisy = compile("// leading\n;; /* block\n comment */ exit(5); ;").unwrap();

    assert_eq!(plain, noisy);
}

#[test]
fn tiny_arena_is_fatal() {
    let source = Source::new("prog.crm", "exit(1 + 2 + 3);");
    let options = CompileOptions { arena_capacity: 4 };

    match cer::compile(&source, &options) {
        Err(CompileError::Fatal(error)) => {
            assert_eq!(error, FatalError::Arena(ArenaError::Exhausted(4)))
        }

        other => panic!("expected arena exhaustion, found {:?}", other),
    }
}

#[test]
fn long_sum_compiles() {
    let terms = vec!["1"; 100_000].join(" + ");
    let asm = compile(&format!("exit({});", terms)).unwrap();

    assert_eq!(count(&asm, "add rax, rbx"), 99_999);
    assert_eq!(count(&asm, "mov rax, 1"), 100_000);
}

#[test]
fn long_elif_chain_compiles() {
    let mut text = String::from("if (1) { }");
    for _ in 0..40_000 {
        text.push_str(" elif (1) { }");
    }

    let asm = compile(&text).unwrap();

    assert_eq!(count(&asm, "_elif_label_0:"), 1);
    assert_eq!(count(&asm, "_elif_label_39999:"), 1);
    assert_eq!(count(&asm, "jmp _end_if_label_0"), 40_001);
    assert_eq!(count(&asm, "_end_if_label_0:"), 1);
}

#[test]
fn deep_nesting_is_fatal() {
    let blocks = format!("{}{}", "{".repeat(40_000), "}".repeat(40_000));
    let parens = format!("exit({}1{});", "(".repeat(40_000), ")".repeat(40_000));

    for text in [blocks, parens] {
        match compile(&text) {
            Err(CompileError::Fatal(error)) => {
                assert_eq!(error, FatalError::TooDeep(MAX_NESTING));
                assert_eq!(
                    error.to_string(),
                    "nesting too deep: more than 128 levels of blocks or parentheses"
                );
            }

            other => panic!("expected a nesting error, found {:?}", other),
        }
    }
}
