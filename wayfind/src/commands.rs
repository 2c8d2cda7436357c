use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("wayfind")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("wayfind")
        .styles(CLAP_STYLING)
        .arg(
            arg!(-q --"quiet" "Suppress progress and non-essential output")
                .required(false)
                .global(true),
        )
        .subcommand_required(true)
        .subcommand(
            command!("sweep")
                .about(
                    "Traverse a running app through its UI as one or more roles and record \
                runtime failures.",
                )
                .arg(
                    arg!(-u --"base-url" <URL>)
                        .required(false)
                        .help("Origin of the app under test")
                        .env("WAYFIND_BASE_URL")
                        .value_parser(clap::value_parser!(Url))
                        .default_value("http://localhost:3000"),
                )
                .arg(
                    arg!(-s --"seeds" <PATHS>)
                        .required(false)
                        .help("Comma-separated entry points for roles without --role-seeds")
                        .env("WAYFIND_SEEDS")
                        .default_value("/"),
                )
                .arg(
                    arg!(-r --"role" <ROLES>)
                        .required(false)
                        .help("Comma-separated roles to run (default: guest, or every --role-seeds role)")
                        .env("WAYFIND_ROLE"),
                )
                .arg(
                    arg!(--"role-seeds" <ROLE_SEEDS>)
                        .required(false)
                        .help("Entry points for one role, e.g. admin=/admin,/admin/users (repeatable)")
                        .action(clap::ArgAction::Append),
                )
                .arg(
                    arg!(--"max-pages" <N>)
                        .required(false)
                        .help("Stop after visiting this many pages (0 = unlimited)")
                        .env("WAYFIND_MAX_PAGES")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("0"),
                )
                .arg(
                    arg!(--"max-depth" <N>)
                        .required(false)
                        .help("Maximum hop depth from an entry point (-1 = unlimited)")
                        .env("WAYFIND_MAX_DEPTH")
                        .value_parser(clap::value_parser!(i64))
                        .allow_negative_numbers(true)
                        .default_value("-1"),
                )
                .arg(
                    arg!(--"max-actions" <N>)
                        .required(false)
                        .help("Safety cap on executed actions (default: 1000 local, 250 remote)")
                        .env("WAYFIND_MAX_ACTIONS")
                        .value_parser(clap::value_parser!(usize)),
                )
                .arg(
                    arg!(--"page-timeout-ms" <MS>)
                        .required(false)
                        .help("Timeout for loading a page")
                        .env("WAYFIND_PAGE_TIMEOUT_MS")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("15000"),
                )
                .arg(
                    arg!(--"stabilization-timeout-ms" <MS>)
                        .required(false)
                        .help("Upper bound for waiting on a page to settle")
                        .env("WAYFIND_STABILIZATION_TIMEOUT_MS")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("20000"),
                )
                .arg(
                    arg!(--"quiet-window-ms" <MS>)
                        .required(false)
                        .help("How long the URL must hold still to count as settled")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("750"),
                )
                .arg(
                    arg!(--"redirect-threshold" <N>)
                        .required(false)
                        .help("URL changes within one step that count as a redirect loop")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("10"),
                )
                .arg(
                    arg!(--"allowed-action-types" <TYPES>)
                        .required(false)
                        .help("Comma-separated subset of link, button, menuitem, select")
                        .env("WAYFIND_ALLOWED_ACTION_TYPES"),
                )
                .arg(
                    arg!(--"include-main-content-links" <BOOL>)
                        .required(false)
                        .help("Also follow links inside <main> (default: true locally, false remote)")
                        .env("WAYFIND_INCLUDE_MAIN_CONTENT_LINKS")
                        .value_parser(clap::value_parser!(bool)),
                )
                .arg(
                    arg!(--"resume-from" <PATH>)
                        .required(false)
                        .help("Checkpoint whose paths are treated as already covered")
                        .env("WAYFIND_RESUME_FROM"),
                )
                .arg(
                    arg!(--"no-checkpoint")
                        .required(false)
                        .help("Do not write a checkpoint at the end of the run")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"checkpoint" <PATH>)
                        .required(false)
                        .help("Where to write the checkpoint (default: <out>/crawl-checkpoint.json)")
                        .conflicts_with("no-checkpoint"),
                )
                .arg(
                    arg!(-o --"out" <DIR>)
                        .required(false)
                        .help("Directory for artifacts")
                        .env("WAYFIND_OUT")
                        .default_value("wayfind-artifacts"),
                )
                .arg(
                    arg!(--"app-dir" <PATH>)
                        .required(false)
                        .help("Route directory to reconcile against (e.g. src/app)")
                        .env("WAYFIND_APP_DIR"),
                )
                .arg(
                    arg!(--"driver" <DRIVER>)
                        .required(false)
                        .help("Page driver: a headless Chrome session or plain HTTP fetches")
                        .value_parser(["chrome", "static"])
                        .default_value("chrome"),
                )
                .arg(
                    arg!(--"chrome-path" <PATH>)
                        .required(false)
                        .help("Chrome executable (default: auto-detect)")
                        .env("WAYFIND_CHROME_PATH"),
                )
                .arg(
                    arg!(--"headful")
                        .required(false)
                        .help("Show the browser window")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"auth-cookies" <PATH>)
                        .required(false)
                        .help("JSON file mapping role names to session cookies")
                        .env("WAYFIND_AUTH_COOKIES"),
                )
                .arg(
                    arg!(--"health-path" <PATH>)
                        .required(false)
                        .help("Path requested before any traversal to check the target is up")
                        .env("WAYFIND_HEALTH_PATH")
                        .default_value("/"),
                ),
        )
        .subcommand(
            command!("routes")
                .about("List the page routes declared in an app directory")
                .arg(
                    arg!(--"app-dir" <PATH>)
                        .required(true)
                        .help("Route directory to scan (e.g. src/app)"),
                )
                .arg(
                    arg!(-g --"graph" <PATH>)
                        .required(false)
                        .help("navigation-graph.json to reconcile the routes against"),
                ),
        )
}
