use std::path::Path;

use topdown_core::cpu::{cpu_id_from_midr, read_midr};
use topdown_core::detect_cpu;

pub fn run(metrics_dir: &str) {
    match read_midr() {
        Ok(midr) => match cpu_id_from_midr(&midr) {
            Some(id) => println!("MIDR:   {midr} (CPU id 0x{id:x})"),
            None => println!("MIDR:   {midr} (unrecognised)"),
        },
        Err(e) => {
            eprintln!("Could not read MIDR: {e}");
            std::process::exit(1);
        }
    }

    match detect_cpu(Path::new(metrics_dir)) {
        Ok(Some(cpu)) => println!("CPU:    {cpu}"),
        Ok(None) => println!("CPU:    unknown (not in {metrics_dir}/mapping.json)"),
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
