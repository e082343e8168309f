// Copyright 2020 - 2021 Alex Dukhno
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#[macro_use]
extern crate log;

use clap::Parser;
use rdb::{format_table, Engine, Outcome};
use std::io::{self, BufRead, Write};
use std::process;

#[derive(Debug, Parser)]
#[command(name = "rdb", about = "A single-user, single-process relational database engine", version = env!("CARGO_PKG_VERSION"))]
struct Config {
    /// Directory the storage environment lives in.
    #[arg(long, default_value = "rdb_data")]
    data_dir: String,

    /// Process-wide identifier rendered in the `DB_<id>>` prompt.
    #[arg(long, default_value_t = process::id())]
    id: u32,
}

fn main() {
    let config = Config::parse();
    simple_logger::init().expect("logger initializes once per process");
    info!("opening storage environment at {}", config.data_dir);

    let mut engine = match Engine::open(&config.data_dir) {
        Ok(engine) => engine,
        Err(e) => {
            error!("failed to open storage environment: {}", e);
            process::exit(1);
        }
    };

    let prompt = format!("DB_{}> ", config.id);
    let stdin = io::stdin();
    let mut buffer = String::new();

    print!("{}", prompt);
    io::stdout().flush().ok();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                error!("failed to read stdin: {}", e);
                break;
            }
        };

        buffer.push_str(&line);
        if !line.trim_end().ends_with(';') {
            buffer.push('\n');
            continue;
        }

        let statements: Vec<String> = buffer.split(';').map(str::trim).filter(|s| !s.is_empty()).map(|s| s.to_owned()).collect();
        buffer.clear();

        let mut exited = false;
        for statement in statements {
            match engine.execute(&statement) {
                Ok(Outcome::Table { headers, rows }) => println!("{}", format_table(&headers, &rows)),
                Ok(Outcome::Message(msg)) => println!("{}{}", prompt, msg),
                Ok(Outcome::Exit) => {
                    if let Err(e) = engine.close() {
                        error!("failed to close storage environment: {}", e);
                    }
                    exited = true;
                    break;
                }
                Err(e) => println!("{}{}", prompt, e),
            }
        }

        if exited {
            return;
        }
        print!("{}", prompt);
        io::stdout().flush().ok();
    }
}
