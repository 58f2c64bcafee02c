use std::sync::Arc;

use colored::Colorize;
use db::Database;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let conf = config::KnowdbConfig::get_or_default();
    let db_conf = config::DbConfig::from_env();

    let Some(api_key) = config::openai_api_key() else {
        eprintln!(
            "{} OPENAI_API_KEY is not set. Export it and try again.",
            "error:".red()
        );
        std::process::exit(1);
    };

    let database = Arc::new(db::postgres::PostgresDatabase::new(db_conf.url()));

    match database.table_names().await {
        Ok(tables) => println!(
            "{} connected to {} ({} tables)",
            "✓".green(),
            db_conf.database,
            tables.len()
        ),
        Err(e) => eprintln!("{} database error: {e}", "✗".red()),
    }

    let toolbox = Arc::new(tools::Toolbox::new(database));
    let client = ai::openai::AssistantsClient::new(&api_key, &conf.ai.base_url);

    println!("Registering assistant...");
    let assistant = ai::Assistant::new(
        client,
        &conf.ai,
        tools::INSTRUCTIONS,
        tools::specs(),
        toolbox,
    )
    .await?;

    println!(
        "\nAsk me anything about your database. Examples:\n\
         - What tables are available in the database?\n\
         - Show me the structure of the users table\n\
         - How many users are there?\n"
    );

    let mut session = ai::Session::new();

    while let Ok(question) = inquire::Text::new("You:").prompt() {
        if question.trim().is_empty() {
            continue;
        }

        let answer = assistant.ask(&mut session, &question).await;
        println!("\n{} {answer}\n", "[Assistant]".blue());
    }

    Ok(())
}
