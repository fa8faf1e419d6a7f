use clap::{Parser, Subcommand};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fs;

const TOKEN_FILE: &str = ".travel_token";

#[derive(Parser)]
#[command(name = "travel-cli")]
#[command(about = "CLI for the travel records API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,
}

#[derive(Subcommand)]
enum Commands {
    Login {
        #[arg(short, long)]
        username: String,
        #[arg(short, long)]
        password: String,
    },
    /// List records; filters and sorts use `field=value` / `field=1|-1`.
    List {
        #[arg(short, long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
        #[arg(short, long = "sort", value_parser = parse_key_value)]
        sorts: Vec<(String, String)>,
        #[arg(short, long)]
        page: Option<u32>,
    },
    Create {
        #[arg(short, long)]
        name: String,
        #[arg(short, long)]
        from: String,
        #[arg(short, long)]
        to: String,
        /// Extra `field=value` pairs stored alongside the required fields.
        #[arg(short = 'x', long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },
    /// Replace (or insert) a record with a full JSON document.
    Put {
        #[arg(short, long)]
        id: String,
        #[arg(short, long)]
        json: String,
    },
    /// Merge the given JSON fields into an existing record.
    Patch {
        #[arg(short, long)]
        id: String,
        #[arg(short, long)]
        json: String,
    },
    Delete {
        #[arg(short, long)]
        id: String,
    },
    Logout,
}

#[derive(Deserialize)]
struct LoginResponse {
    token: String,
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))
}

fn parse_document(raw: &str) -> Result<Value, Box<dyn std::error::Error>> {
    let value: Value = serde_json::from_str(raw)?;
    if !value.is_object() {
        return Err("document must be a JSON object".into());
    }
    Ok(value)
}

fn authorized(builder: RequestBuilder) -> RequestBuilder {
    let token = fs::read_to_string(TOKEN_FILE).unwrap_or_default();
    builder.header("Authorization", format!("Bearer {}", token.trim()))
}

async fn print_response(res: Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    if text.is_empty() {
        println!("{}", status);
    } else {
        println!("{} {}", status, text);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = Client::new();
    let records = format!("{}/api/records", cli.url);

    match cli.command {
        Commands::Login { username, password } => {
            let res = client.post(format!("{}/api/login", cli.url))
                .json(&json!({ "username": username, "password": password }))
                .send()
                .await?;
            if res.status().is_success() {
                let body: LoginResponse = res.json().await?;
                // Save token
                fs::write(TOKEN_FILE, body.token)?;
                println!("Logged in. Token saved to {}", TOKEN_FILE);
            } else {
                println!("Login failed: {}", res.status());
            }
        }
        Commands::List { filters, sorts, page } => {
            let mut query: Vec<(String, String)> = Vec::new();
            query.extend(filters.into_iter().map(|(k, v)| (format!("filter[{}]", k), v)));
            query.extend(sorts.into_iter().map(|(k, v)| (format!("sort[{}]", k), v)));
            if let Some(page) = page {
                query.push(("page".to_string(), page.to_string()));
            }
            let res = authorized(client.get(&records).query(&query)).send().await?;
            print_response(res).await?;
        }
        Commands::Create { name, from, to, fields } => {
            let mut body = Map::new();
            for (k, v) in fields {
                body.insert(k, Value::String(v));
            }
            body.insert("name".to_string(), Value::String(name));
            body.insert("from".to_string(), Value::String(from));
            body.insert("to".to_string(), Value::String(to));
            let res = authorized(client.post(&records).json(&body)).send().await?;
            print_response(res).await?;
        }
        Commands::Put { id, json } => {
            let body = parse_document(&json)?;
            let res = authorized(client.put(format!("{}/{}", records, id)).json(&body))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Patch { id, json } => {
            let body = parse_document(&json)?;
            let res = authorized(client.patch(format!("{}/{}", records, id)).json(&body))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Delete { id } => {
            let res = authorized(client.delete(format!("{}/{}", records, id)))
                .send()
                .await?;
            print_response(res).await?;
        }
        Commands::Logout => {
            let _ = fs::remove_file(TOKEN_FILE);
            println!("Logged out (token removed).");
        }
    }

    Ok(())
}
