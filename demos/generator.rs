//! Generates a CSV file of vault requests for a number of users supplied as a
//! command-line argument.
//!
//! The file can be fed to the `memo-vault` binary to exercise a journal with
//! realistic traffic.
//!
//! Example (100 users):
//! ```bash
//! cargo run --example generator 100 > requests.csv
//! cargo run -- requests.csv
//! ```
//!
//! Every user registers, logs in, saves `NUM_KEYS` keys, renews the first
//! `NUM_RENEWALS` of them, then repeats one save (rejected with "Key exists")
//! and one gated request with a wrong password (rejected as denied). Rounds are
//! interleaved across users, so the journal sees writes from every account in
//! turn.

use csv::Writer;
use memo_vault::Request;
use std::{env, error::Error};

const NUM_KEYS: usize = 20;
const NUM_RENEWALS: usize = 5;

fn main() -> Result<(), Box<dyn Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        eprintln!("Usage: cargo run --example generator <num_users>");
        std::process::exit(1);
    }

    let num_users: u32 = match args[1].parse() {
        Ok(n) if n > 0 => n,
        _ => {
            eprintln!("Error: <num_users> must be a positive integer.");
            std::process::exit(1);
        }
    };

    // register, login, saves, renewals, duplicate save, bad password
    let total_rounds = 2 + NUM_KEYS + NUM_RENEWALS + 2;

    let mut wtr = Writer::from_writer(std::io::stdout());
    for round in 0..total_rounds {
        for user in 1..=num_users {
            let username = format!("user{user}");
            let password = format!("pw{user}");
            let request = match round {
                0 => Request::new("register", &username, &password),
                1 => Request::new("login", &username, &password),
                r if r < 2 + NUM_KEYS => Request::new("save", &username, &password)
                    .with_key(&format!("key{}", r - 2)),
                r if r < 2 + NUM_KEYS + NUM_RENEWALS => {
                    Request::new("renew", &username, &password)
                        .with_key(&format!("key{}", r - 2 - NUM_KEYS))
                }
                r if r == total_rounds - 2 => {
                    Request::new("save", &username, &password).with_key("key0")
                }
                _ => Request::new("give", &username, "wrong").with_value("key0"),
            };
            wtr.serialize(request)?;
        }
    }
    wtr.flush()?;
    Ok(())
}
