use clap::Parser;

#[derive(Debug, Clone, Default, Parser)]
#[command(name = "bongo-cat", version = bongo_core::VERSION, about = bongo_core::DESCRIPTION)]
pub struct Cli {
    /// Start quietly in the tray.
    #[arg(long)]
    pub minimized: bool,

    /// Launched by the autostart task; implies --minimized.
    #[arg(long)]
    pub startup: bool,
}

impl Cli {
    pub fn start_minimized(&self) -> bool {
        self.minimized || self.startup
    }
}

/// Quote one argument for a Windows command line so that
/// `CommandLineToArgvW` gives it back unchanged.
pub fn quote_arg(arg: &str) -> String {
    if !arg.is_empty() && !arg.contains([' ', '\t', '"']) {
        return arg.to_string();
    }
    let mut out = String::from('"');
    let mut backslashes = 0usize;
    for c in arg.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                out.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            _ => {
                out.extend(std::iter::repeat('\\').take(backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }
    out.extend(std::iter::repeat('\\').take(backslashes * 2));
    out.push('"');
    out
}

pub fn join_args<I, S>(args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter()
        .map(|a| quote_arg(a.as_ref()))
        .collect::<Vec<_>>()
        .join(" ")
}
