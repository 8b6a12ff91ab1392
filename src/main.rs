use log::info;
use std::env;
use std::fs;
use std::path::Path;
use std::process;

use zlurk::errors::ZlurkResult;
use zlurk::interpreter::Interpreter;
use zlurk::memory::Memory;
use zlurk::trace::Trace;
use zlurk::vm::VM;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args: Vec<String> = env::args().collect();
    let mut trace_enabled = false;
    let mut story_path: Option<&str> = None;
    for arg in &args[1..] {
        match arg.as_str() {
            "--trace" => trace_enabled = true,
            path if story_path.is_none() => story_path = Some(path),
            _ => {
                eprintln!("Usage: {} [--trace] <story-file>", args[0]);
                process::exit(1);
            }
        }
    }

    let Some(story_path) = story_path else {
        eprintln!("Usage: {} [--trace] <story-file>", args[0]);
        process::exit(1);
    };

    if let Err(e) = run(Path::new(story_path), trace_enabled) {
        eprintln!("zlurk: {e}");
        process::exit(e.exit_code());
    }
}

fn run(story_path: &Path, trace_enabled: bool) -> ZlurkResult<()> {
    let bytes = fs::read(story_path)?;
    let memory = Memory::load(bytes)?;
    info!("{}", memory.header);

    let vm = VM::new(memory)?;
    let mut interpreter = Interpreter::new(vm);
    if trace_enabled {
        interpreter.set_trace(Trace::for_story(story_path)?);
    }

    interpreter.run()
}
