use clap::{CommandFactory, Parser};
use hostwarden::tooling::cli::{Cli, Commands};

#[test]
fn parse_valid_command_matrix() {
    let cases: Vec<Vec<&str>> = vec![
        vec!["hostwarden", "modules"],
        vec!["hostwarden", "run", "--module", "host"],
        vec!["hostwarden", "properties", "--module", "network"],
        vec!["hostwarden", "get", "--module", "host", "--property", "hostname"],
        vec![
            "hostwarden", "set", "--module", "host", "--property", "update_interval", "--value", "10",
        ],
        vec!["hostwarden", "call", "--module", "network", "--method", "status", "eth0"],
        vec![
            "hostwarden", "apply", "--text", "x=1", "--scheme", "puppet", "--key", "web", "--force",
        ],
        vec![
            "hostwarden", "apply", "--uri", "https://example.org/site.pp", "--scheme", "puppet",
            "--key", "web",
        ],
        vec!["hostwarden", "is-configured", "--key", "web"],
        vec!["hostwarden", "set-configured", "--key", "web", "--contents", "ok"],
        vec!["hostwarden", "query", "--scheme", "augeas", "--text", "/files/etc/hosts"],
        vec!["hostwarden", "--log-format", "json", "--caller", ":1.9", "modules"],
    ];

    for args in cases {
        let parsed = Cli::try_parse_from(args.clone());
        assert!(parsed.is_ok(), "expected valid parse for args: {args:?}");
    }
}

#[test]
fn parse_rejects_conflicting_apply_sources() {
    let both = Cli::try_parse_from([
        "hostwarden", "apply", "--uri", "file:///a", "--text", "x", "--scheme", "s", "--key", "k",
    ]);
    assert!(both.is_err());

    let neither = Cli::try_parse_from(["hostwarden", "apply", "--scheme", "s", "--key", "k"]);
    assert!(neither.is_err());
}

#[test]
fn parse_requires_module() {
    assert!(Cli::try_parse_from(["hostwarden", "get", "--property", "hostname"]).is_err());
    assert!(Cli::try_parse_from(["hostwarden", "run"]).is_err());
}

#[test]
fn call_collects_trailing_args() {
    let cli = Cli::try_parse_from([
        "hostwarden", "call", "--module", "host", "--method", "set_uuid", "custom", "abc",
    ])
    .unwrap();
    match cli.command {
        Commands::Call { method, args, .. } => {
            assert_eq!(method, "set_uuid");
            assert_eq!(args, vec!["custom", "abc"]);
        }
        _ => panic!("expected call"),
    }
}

#[test]
fn command_definition_is_consistent() {
    Cli::command().debug_assert();
}
