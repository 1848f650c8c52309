// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: configuration file
fn config_arg() -> Arg {
    Arg::new("config")
        .short('c')
        .long("config")
        .value_name("FILE")
        .required(true)
        .help("Configuration file")
}

fn build_cli() -> Command {
    Command::new("warsito")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Warsito Contributors")
        .about("Bundle Debian packages for a derivative distribution")
        .subcommand_required(true)
        .subcommand(
            Command::new("build")
                .about("Build bundles for one or more packages")
                .arg(config_arg())
                .arg(
                    Arg::new("seed")
                        .short('s')
                        .long("seed")
                        .value_name("FILE")
                        .required(true)
                        .help("Seed file listing the base image packages"),
                )
                .arg(
                    Arg::new("packages")
                        .short('p')
                        .long("packages")
                        .value_name("FILE")
                        .required(true)
                        .help("Debian Packages file describing the available packages"),
                )
                .arg(
                    Arg::new("mirror")
                        .short('m')
                        .long("mirror")
                        .value_name("URL")
                        .required(true)
                        .help("Mirror base URL the Filename fields are relative to"),
                )
                .arg(
                    Arg::new("strict")
                        .long("strict")
                        .action(ArgAction::SetTrue)
                        .help("Fail when a dependency group has no available alternative"),
                )
                .arg(
                    Arg::new("names")
                        .required(true)
                        .num_args(1..)
                        .help("Packages to bundle"),
                ),
        )
        .subcommand(
            Command::new("publish")
                .about("Copy built bundles from the result directory into the publish tree")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("index")
                .about("Append published bundles to the Packages.info index")
                .arg(config_arg())
                .arg(
                    Arg::new("arch")
                        .short('a')
                        .long("arch")
                        .help("Architecture to index (default: every configured architecture)"),
                )
                .arg(
                    Arg::new("names")
                        .required(true)
                        .num_args(1..)
                        .help("Packages to index"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = match env::var("OUT_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=OUT_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = out_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    if let Err(e) = fs::write(man_dir.join("warsito.1"), buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
