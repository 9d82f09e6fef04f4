use clap::{CommandFactory, Parser};
use intentbus::config::TransportKind;
use intentbus::tooling::cli::{Cli, Commands, RedeliveryLimit};

#[test]
fn parse_valid_command_matrix() {
    let cases: Vec<Vec<&str>> = vec![
        vec!["intentbus", "run"],
        vec!["intentbus", "run", "--name", "users", "--transport", "memory"],
        vec![
            "intentbus",
            "run",
            "--seed",
            "{\"intent\":\"echo\"}",
            "--seed",
            "{\"intent\":\"echo\",\"n\":2}",
        ],
        vec!["intentbus", "run", "--max-redeliveries", "unbounded"],
        vec!["intentbus", "resolve", "{\"intent\":\"echo\"}"],
        vec!["intentbus", "resolve", "--file", "message.json"],
        vec!["intentbus", "resolvers", "--format", "json"],
        vec!["intentbus", "--config", "agent.toml", "--log-level", "debug", "config"],
    ];

    for args in cases {
        let parsed = Cli::try_parse_from(args.clone());
        assert!(parsed.is_ok(), "expected valid parse for args: {args:?}");
    }
}

#[test]
fn parse_run_overrides() {
    let cli = Cli::try_parse_from([
        "intentbus",
        "run",
        "--transport",
        "memory",
        "--max-redeliveries",
        "3",
        "--seed",
        "{}",
    ])
    .unwrap();
    match cli.command {
        Commands::Run {
            transport,
            max_redeliveries,
            seeds,
            ..
        } => {
            assert_eq!(transport, Some(TransportKind::Memory));
            assert_eq!(max_redeliveries, Some(RedeliveryLimit(Some(3))));
            assert_eq!(seeds, vec!["{}".to_string()]);
        }
        _ => panic!("expected run command"),
    }
}

#[test]
fn parse_rejects_invalid_input() {
    assert!(Cli::try_parse_from(["intentbus", "run", "--transport", "amqp"]).is_err());
    assert!(Cli::try_parse_from(["intentbus", "run", "--max-redeliveries", "lots"]).is_err());
    assert!(Cli::try_parse_from([
        "intentbus",
        "resolve",
        "{}",
        "--file",
        "message.json"
    ])
    .is_err());
    assert!(Cli::try_parse_from(["intentbus"]).is_err());
}

#[test]
fn command_definition_is_consistent() {
    Cli::command().debug_assert();
}
