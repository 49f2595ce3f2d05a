//! # Punchlist CLI
//!
//! Usage:
//!   punchlist input.json -o report.pdf
//!   echo '{ ... }' | punchlist --kind signoff
//!   punchlist --example > walkthrough.json

use std::env;
use std::fs;
use std::io::{self, Read};

use punchlist::DocKind;

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--example") {
        print!("{}", example_walkthrough_json());
        return;
    }

    let input = if args.len() > 1 && !args[1].starts_with('-') {
        fs::read_to_string(&args[1]).expect("Failed to read input file")
    } else {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .expect("Failed to read stdin");
        buf
    };

    let kind = match args
        .windows(2)
        .find(|w| w[0] == "--kind")
        .map(|w| w[1].as_str())
    {
        Some("signoff") => DocKind::SignOff,
        _ => DocKind::Report,
    };

    let output_path = args.windows(2).find(|w| w[0] == "-o").map(|w| w[1].clone());

    match punchlist::generate_json(&input, kind) {
        Ok(doc) => {
            let path = output_path.unwrap_or(doc.filename);
            fs::write(&path, &doc.bytes).expect("Failed to write PDF");
            eprintln!("✓ Written {} bytes to {}", doc.bytes.len(), path);
        }
        Err(e) => {
            eprintln!("✗ {}", e);
            std::process::exit(1);
        }
    }
}

fn example_walkthrough_json() -> &'static str {
    r##"{
  "projectName": "Maple Street 14",
  "fields": [
    { "label": "Owner", "value": "J. Alvarez" },
    { "label": "Builder", "value": "Hartwell Homes" },
    { "label": "Walkthrough date", "value": "2026-08-01" }
  ],
  "locations": [
    {
      "id": 1,
      "name": "Kitchen",
      "issues": [
        {
          "id": 101,
          "description": "Scratch on the island countertop near the sink",
          "photos": []
        },
        {
          "id": 102,
          "description": "Cabinet door misaligned under the cooktop",
          "photos": []
        }
      ]
    },
    {
      "id": 2,
      "name": "Notes",
      "issues": [
        {
          "id": 201,
          "description": "Owner to confirm paint color for the touch-up list",
          "photos": []
        }
      ]
    }
  ]
}
"##
}
