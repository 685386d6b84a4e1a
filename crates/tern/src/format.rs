//! Command output: every CLI result is a serializable value printed as
//! JSON or YAML.

use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
}

pub fn render<T: Serialize>(format: OutputFormat, value: &T) -> anyhow::Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(value)?,
        OutputFormat::Yaml => serde_yaml::to_string(value)?,
    })
}

pub fn print<T: Serialize>(format: OutputFormat, value: &T) -> anyhow::Result<()> {
    let text = render(format, value)?;
    println!("{}", text.trim_end());
    Ok(())
}
