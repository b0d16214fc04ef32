use clap::Parser as ClapParser;
use std::{
    fs,
    io::{self, Write},
    process,
};

use mara::{
    HeapCreateInfo, Interpreter, InterpreterCreateInfo, MachineCreateInfo,
    OutputMode, Value,
};

#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input source files to execute in order
    #[arg(required = false, help = "The .mara files to execute")]
    files: Vec<String>,

    /// Start REPL after executing files (default if no files)
    #[arg(long, help = "Force REPL mode after file execution")]
    repl: bool,

    /// Print bytecode and constants instead of executing
    #[arg(long, help = "Dump assembled bytecode + constant pool for inputs")]
    dump_bytecode: bool,

    #[arg(long, help = "Log every machine step (implies RUST_LOG=mara=trace)")]
    trace: bool,

    #[arg(long, help = "Run the type checker before compiling")]
    type_check: bool,

    #[arg(long, help = "Collect program output and print it after each run")]
    buffered: bool,

    #[arg(long, default_value_t = 16, help = "Initial heap size in cells")]
    heap_cells: usize,
}

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_default_env();
    if cli.trace {
        logger.filter_module("mara", log::LevelFilter::Trace);
    }
    logger.init();

    let mut interpreter = Interpreter::new(InterpreterCreateInfo {
        machine: MachineCreateInfo {
            output: if cli.buffered {
                OutputMode::Buffered
            } else {
                OutputMode::Immediate
            },
            trace: cli.trace,
            heap: HeapCreateInfo {
                capacity: cli.heap_cells,
            },
        },
        type_check: cli.type_check,
        dump_on_error: true,
    });

    for filename in &cli.files {
        let source_code = match fs::read_to_string(filename) {
            Ok(content) => content,
            Err(err) => {
                eprintln!("Error reading file '{}': {}", filename, err);
                process::exit(1);
            }
        };

        if cli.dump_bytecode {
            match interpreter.compile(&source_code) {
                Ok(program) => {
                    println!("== {} ==", filename);
                    print!("{}", program.listing());
                    println!("result: r{}", program.result);
                }
                Err(err) => {
                    eprintln!("Error compiling {}: {}", filename, err);
                    process::exit(1);
                }
            }
            continue;
        }

        let outcome = interpreter.evaluate(&source_code);
        interpreter.flush();
        match outcome {
            Ok(value) => print_value(value),
            Err(err) => {
                eprintln!("Error executing {}: {}", filename, err);
                process::exit(1);
            }
        }
    }

    if cli.dump_bytecode {
        return;
    }

    if cli.repl || cli.files.is_empty() {
        run_repl(&mut interpreter);
    }
}

fn run_repl(interpreter: &mut Interpreter) {
    println!("mara REPL");
    println!("Type 'exit' to quit.");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut input_buffer = String::new();

    loop {
        print!("> ");
        if let Err(err) = stdout.flush() {
            eprintln!("Error flushing stdout: {}", err);
            break;
        }

        input_buffer.clear();
        match stdin.read_line(&mut input_buffer) {
            Ok(0) => break,
            Ok(_) => {
                let input = input_buffer.trim();
                if input == "exit" {
                    break;
                }
                if input.is_empty() {
                    continue;
                }

                let outcome = interpreter.evaluate(input);
                interpreter.flush();
                match outcome {
                    Ok(value) => print_value(value),
                    Err(err) => eprintln!("Error: {}", err),
                }
            }
            Err(err) => {
                eprintln!("Error reading input: {}", err);
                break;
            }
        }
    }
}

fn print_value(value: Value) {
    println!("{}", render(value));
}

fn render(value: Value) -> String {
    format!("=> {value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_render_with_an_arrow() {
        assert_eq!(render(Value::Int(42)), "=> 42");
        assert_eq!(render(Value::Real(2.5)), "=> 2.5");
    }

    #[test]
    fn absent_values_render_as_null() {
        let value = mara::evaluate("if 0 { 1 }").unwrap();
        assert_eq!(render(value), "=> NULL");
        let value = mara::evaluate("var i = 0\nwhile i < 2 { i = i + 1 }").unwrap();
        assert_eq!(render(value), "=> NULL");
    }
}
