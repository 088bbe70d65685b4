fn main() {
    if handle_cli_flags() {
        return;
    }

    if let Err(err) = chan_client::run() {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn handle_cli_flags() -> bool {
    let mut saw_flag = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("chan-client {}", chan_client::VERSION);
                saw_flag = true;
            }
            "--help" | "-h" => {
                println!(
                    "chan-client: render imageboard threads the way the browser client does.\n\n  --version, -V            Show version and exit\n  --help,    -h            Show this help message\n  --render <thread.json>   Print each post of a thread as HTML\n  --index                  Render as on a board index page\n  --all                    Render as on the /all/ board\n  --config <path>          Read configuration from <path>"
                );
                saw_flag = true;
            }
            _ => {}
        }
    }
    saw_flag
}
