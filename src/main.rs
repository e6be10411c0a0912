use std::io::Read;
use std::{env, fs, io, process};

use inkwell::context::Context;

use kscope::codegen::Compiler;
use kscope::error;
use kscope::parser::{Parser, Session};

fn main() {
    let args: Vec<String> = env::args().collect();

    let (source, filename) = match args.get(1) {
        Some(path) => match fs::read_to_string(path) {
            Ok(source) => (source, path.clone()),
            Err(err) => {
                eprintln!("error: cannot read '{}': {}", path, err);
                process::exit(1);
            }
        },
        None => {
            let mut source = String::new();
            if let Err(err) = io::stdin().read_to_string(&mut source) {
                eprintln!("error: cannot read stdin: {}", err);
                process::exit(1);
            }
            (source, "<stdin>".to_string())
        }
    };

    let context = Context::create();
    let mut compiler = Compiler::new(&context);
    let mut session = Session::new();

    let mut parser = Parser::new(&source, &mut session);

    // Each top-level unit compiles independently; a failed unit is reported
    // and skipped, and everything after it still goes through.
    let mut failed = false;
    loop {
        match parser.parse_item() {
            Ok(Some(item)) => {
                if let Err(err) = compiler.compile_item(&item) {
                    error::display_codegen_error(&source, &filename, &err);
                    failed = true;
                }
            }
            Ok(None) => break,
            Err(err) => {
                error::display_parse_error(&source, &filename, &err);
                failed = true;
                parser.skip_to_next_item();
            }
        }
    }

    print!("{}", compiler.ir());

    if failed {
        process::exit(1);
    }
}
