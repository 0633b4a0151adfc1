//! the main compiler binary. takes a source file and an optional output
//! format (assembly by default).
//!
//! run with `--help` for more info.

use cflatc::{back, front, middle};

use clap::{Parser, ValueEnum};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// the input file
    file: String,
    /// the output format
    #[arg(value_enum, short, long, default_value_t = Output::Asm)]
    out: Output,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
enum Output {
    /// the list of tokens
    Tokens,
    /// the ast data structure
    Ast,
    /// the three-address-code ir, one step per line
    Ir,
    /// the resulting assembly code
    Asm,
}

fn main() {
    use Output::*;
    let args = Args::parse();

    let input = String::from_utf8(std::fs::read(&args.file).expect("file should be readable"))
        .expect("input characters should be utf8");

    match args.out {
        Tokens => {
            let mut lexer = front::lex::Lexer::new(&input);
            loop {
                match lexer.next().expect("source should lex") {
                    Some(token) => println!("{token}"),
                    None => break,
                }
            }
        }
        Ast => {
            println!("{:?}", front::parse(&input).expect("source should parse"));
        }
        Ir => {
            let program = front::parse(&input).expect("source should parse");
            let sem_table = front::semantics::collect(&program);
            let (steps, _) = middle::lower(&program, &sem_table);
            for step in &steps {
                println!("{step:?}");
            }
        }
        Asm => {
            let program = front::parse(&input).expect("source should parse");
            let sem_table = front::semantics::collect(&program);
            let (steps, funcs) = middle::lower(&program, &sem_table);
            let lines = back::emit(&steps, &funcs).expect("codegen should succeed");
            for line in lines {
                print!("{line}");
            }
        }
    }
}
