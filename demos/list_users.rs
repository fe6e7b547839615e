//! Calls IAM's `ListUsers` (query protocol) and prints the decoded result.
//!
//! Credentials are resolved the normal way (explicit -> environment ->
//! `~/.aws/credentials` -> anonymous); pass `--region` to override the
//! default `us-east-1`.

use aws_client_core::client::{Client, ClientConfig};
use aws_client_core::shape::{Member, Shape, UnitShape};
use aws_client_core::validator::OutputSpec;
use aws_client_core::{Region, ServiceProtocol};
use clap::Parser;

#[derive(Parser)]
struct Args {
    #[arg(long)]
    region: Option<String>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let region: Region = args
        .region
        .as_deref()
        .unwrap_or("us-east-1")
        .parse()
        .expect("valid region identifier");

    let config = ClientConfig::new("iam", ServiceProtocol::Query)
        .region(region)
        .api_version("2010-05-08");
    let client = Client::new(config).expect("resolving credentials");

    let output_spec = OutputSpec {
        result_wrapper_names: &["ListUsersResult"],
        ..OutputSpec::default()
    };

    let result: Result<serde_json::Value, _> = client.send_with_input_for_output(
        "ListUsers",
        "/",
        http::Method::GET,
        &EmptyInput,
        &output_spec,
    );

    match result {
        Ok(value) => println!("{}", serde_json::to_string_pretty(&value).unwrap()),
        Err(err) => eprintln!("ListUsers failed: {err}"),
    }
}

/// `ListUsers` has no input members; `UnitShape` would work equally well,
/// this exists only to show what a generated input type looks like.
#[derive(Debug)]
struct EmptyInput;

impl Shape for EmptyInput {
    fn members(&self) -> &'static [Member] {
        UnitShape.members()
    }
    fn header_params(&self) -> &'static [(&'static str, &'static str)] {
        UnitShape.header_params()
    }
    fn query_params(&self) -> &'static [(&'static str, &'static str)] {
        UnitShape.query_params()
    }
    fn path_params(&self) -> &'static [(&'static str, &'static str)] {
        UnitShape.path_params()
    }
    fn payload_path(&self) -> Option<&'static str> {
        UnitShape.payload_path()
    }
    fn get(&self, field_name: &str) -> Option<aws_client_core::shape::FieldValue> {
        UnitShape.get(field_name)
    }
}
