//! `colloquy tools`: Show the tools offered to the model.

use colloquy_config::AppConfig;
use colloquy_core::tool::ToolDescriptor;

pub fn run(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = colloquy_tools::default_registry(config)?;
    let descriptors = registry.describe_all();

    println!("Registered tools ({}):", descriptors.len());
    for descriptor in &descriptors {
        println!();
        print!("{}", describe(descriptor)?);
    }

    if !config.vector_store.is_configured() {
        println!();
        println!(
            "  searchVectorStore is disabled: set PINECONE_API_KEY and \
             PINECONE_INDEX_HOST to enable it."
        );
    }
    Ok(())
}

fn describe(descriptor: &ToolDescriptor) -> Result<String, serde_json::Error> {
    let schema = serde_json::to_string_pretty(&descriptor.parameters)?;
    let mut out = format!("  {}\n    {}\n", descriptor.name, descriptor.description);
    for line in schema.lines() {
        out.push_str("    ");
        out.push_str(line);
        out.push('\n');
    }
    Ok(out)
}
