//! Interactive driver for input method description files.
//!
//! Loads a description file and feeds it key names read from stdin, one
//! whitespace-separated key per token, printing the observables after every
//! line. Useful while writing description files.
//!
//! Usage: `okuri-repl [--trace] FILE.mim`

use std::io::{BufRead, Write};
use std::process::ExitCode;

use okuri::{Context, Engine, MemDatabase, StderrTracer};

fn main() -> ExitCode {
    let mut trace = false;
    let mut path = None;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--trace" => trace = true,
            "--help" | "-h" => {
                eprintln!("usage: okuri-repl [--trace] FILE.mim");
                return ExitCode::SUCCESS;
            }
            _ => path = Some(arg),
        }
    }
    let Some(path) = path else {
        eprintln!("usage: okuri-repl [--trace] FILE.mim");
        return ExitCode::FAILURE;
    };
    let source = match std::fs::read_to_string(&path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("okuri-repl: cannot read {path}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut db = MemDatabase::new();
    let tag = match db.register_source(&source) {
        Ok(tag) => tag,
        Err(err) => {
            eprintln!("okuri-repl: {path} has no (input-method …) header or fails to parse: {err}");
            return ExitCode::FAILURE;
        }
    };
    let engine = Engine::new(db);
    let im = match engine.open_tagged(&tag) {
        Ok(im) => im,
        Err(err) => {
            eprintln!("okuri-repl: cannot load {tag}: {err}");
            return ExitCode::FAILURE;
        }
    };
    let mut ic = match engine.create_ic(&im) {
        Ok(ic) => ic,
        Err(err) => {
            eprintln!("okuri-repl: cannot create context: {err}");
            return ExitCode::FAILURE;
        }
    };
    if trace {
        ic.set_tracer(Box::new(StderrTracer));
    }

    println!("loaded {} ({}); type key names, :reset, or :quit", im.name(), im.title());
    let stdin = std::io::stdin();
    let mut committed = String::new();
    loop {
        print!("okuri> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(err) => {
                eprintln!("okuri-repl: {err}");
                break;
            }
        }
        let line = line.trim();
        match line {
            "" => continue,
            ":quit" | ":q" => break,
            ":reset" => {
                ic.reset();
                committed.clear();
                println!("(reset)");
                continue;
            }
            ":status" => {
                println!("status: {}", ic.status());
                continue;
            }
            _ => {}
        }
        for key in line.split_whitespace() {
            let ret = ic.filter(key);
            if ret == 0 {
                let mut out = String::new();
                let code = ic.lookup(engine.intern(key), &mut out);
                committed.push_str(&out);
                if code < 0 {
                    // the host would re-dispatch the key itself
                    committed.push_str(key);
                }
            }
        }
        println!("preedit:   {:?} (cursor {})", ic.preedit_text(), ic.cursor_pos());
        if let Some(list) = ic.candidate_list() {
            let (group, _) = list.locate(ic.candidate_index()).unwrap_or((0, 0));
            let members = &list.groups()[group];
            println!(
                "candidates {}[{}] of {}: {}",
                if ic.candidate_show() { "" } else { "(hidden) " },
                ic.candidate_index(),
                list.len(),
                members.join(" ")
            );
        }
        println!("committed: {committed:?}");
    }
    ExitCode::SUCCESS
}
