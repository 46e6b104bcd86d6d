use clap::Parser;

use syncpack_cli::Cli;

fn main() {
    let cli = Cli::parse();
    syncpack_cli::init_logging(&["syncpack_core=info", "syncpack_cli=info"]);

    if let Err(e) = syncpack_cli::run(cli) {
        tracing::error!("{:#}", e);
        std::process::exit(1);
    }
}
