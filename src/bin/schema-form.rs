//! Schema Form CLI
//!
//! Command-line interface for resolving schemas, rendering form trees and
//! replaying form actions over JSON files.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use schema_form::{
    lint_files, load_json, load_json_auto, pointer_to_path, resolve, validate_form_data,
    ArrayOperation, ErrorSchema, Form, FormAction, FormOptions, JsonSchemaValidator, LintStatus,
    Registry, SchemaResolver, Severity, ValidateError,
};

#[derive(Parser)]
#[command(name = "schema-form")]
#[command(about = "Resolve, render and edit JSON Schema driven forms")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a schema node ($ref, allOf, if/then/else, dependencies) against data
    Resolve {
        /// Schema source: file path or URL (http:// or https://)
        schema: String,

        /// Form data the conditional keywords are evaluated against
        #[arg(long)]
        data: Option<PathBuf>,

        /// Dereference every $ref in the tree instead of only the root node
        #[arg(long)]
        all_refs: bool,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print the render description tree of a form
    Render {
        /// Schema source: file path or URL (http:// or https://)
        schema: String,

        /// uiSchema file
        #[arg(long)]
        ui: Option<PathBuf>,

        /// Form data file
        #[arg(long)]
        data: Option<PathBuf>,

        /// Error schema file, e.g. from an earlier `validate --json`
        #[arg(long)]
        errors: Option<PathBuf>,

        /// FormOptions file (id prefix, separators, defaults, global ui options)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Validate form data against a schema
    Validate {
        /// Form data file to validate
        data: PathBuf,

        /// Schema source: file path or URL (http:// or https://)
        #[arg(long)]
        schema: String,

        /// Output results as JSON (for automation)
        #[arg(long)]
        json: bool,
    },

    /// Apply one form action and print the change plus the new data
    Mutate {
        /// Schema source: file path or URL (http:// or https://)
        schema: String,

        /// uiSchema file
        #[arg(long)]
        ui: Option<PathBuf>,

        /// Form data file
        #[arg(long)]
        data: Option<PathBuf>,

        /// Error schema file to remap along with the data
        #[arg(long)]
        errors: Option<PathBuf>,

        /// FormOptions file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Array operation: insert, insert:<i>, remove:<i>, copy:<i>, move:<i>:<j>
        #[arg(long, conflicts_with = "action", required_unless_present = "action")]
        op: Option<String>,

        /// JSON Pointer to the array the operation applies to
        #[arg(long, default_value = "")]
        path: String,

        /// Any form action as JSON, e.g. {"action":"selectBranch","path":"","index":1}
        #[arg(long, conflicts_with = "op")]
        action: Option<String>,

        /// Output file (stdout if not specified)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Lint a schema and uiSchema (broken refs, invalid ui:order, unknown fields)
    Lint {
        /// Schema file to lint
        schema: PathBuf,

        /// uiSchema file checked against the schema
        #[arg(long)]
        ui: Option<PathBuf>,

        /// Output format: text (default) or json
        #[arg(long, default_value = "text")]
        format: String,

        /// Treat warnings as errors
        #[arg(long)]
        strict: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Resolve {
            schema,
            data,
            all_refs,
            output,
            pretty,
        } => run_resolve(&schema, data.as_deref(), all_refs, output, pretty),

        Commands::Render {
            schema,
            ui,
            data,
            errors,
            config,
            output,
            pretty,
        } => run_render(
            FormInputs {
                schema,
                ui,
                data,
                errors,
                config,
            },
            output,
            pretty,
        ),

        Commands::Validate { data, schema, json } => run_validate(&data, &schema, json),

        Commands::Mutate {
            schema,
            ui,
            data,
            errors,
            config,
            op,
            path,
            action,
            output,
            pretty,
        } => run_mutate(
            FormInputs {
                schema,
                ui,
                data,
                errors,
                config,
            },
            op,
            &path,
            action,
            output,
            pretty,
        ),

        Commands::Lint {
            schema,
            ui,
            format,
            strict,
        } => run_lint(&schema, ui.as_deref(), &format, strict),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(code) => ExitCode::from(code),
    }
}

/// Files a form is built from.
struct FormInputs {
    schema: String,
    ui: Option<PathBuf>,
    data: Option<PathBuf>,
    errors: Option<PathBuf>,
    config: Option<PathBuf>,
}

impl FormInputs {
    fn build(self) -> Result<Form, u8> {
        let schema = load_json_auto(&self.schema).map_err(|e| {
            eprintln!("Error loading schema: {}", e);
            e.exit_code() as u8
        })?;
        let ui_schema = load_optional(self.ui.as_deref(), "uiSchema")?.unwrap_or_else(|| json!({}));
        let data = load_optional(self.data.as_deref(), "data")?;

        let options = match load_optional(self.config.as_deref(), "config")? {
            Some(config) => serde_json::from_value::<FormOptions>(config).map_err(|e| {
                eprintln!("Error: invalid config: {}", e);
                2u8
            })?,
            None => FormOptions::default(),
        };

        let mut form = Form::new(schema, ui_schema, data, Registry::new().with_options(options))
            .map_err(|e| {
                eprintln!("Error: {}", e);
                e.exit_code() as u8
            })?;

        if let Some(errors) = load_optional(self.errors.as_deref(), "error schema")? {
            let errors = serde_json::from_value::<ErrorSchema>(errors).map_err(|e| {
                eprintln!("Error: invalid error schema: {}", e);
                2u8
            })?;
            form.set_errors(errors);
        }
        Ok(form)
    }
}

fn load_optional(path: Option<&Path>, what: &str) -> Result<Option<Value>, u8> {
    path.map(|path| {
        load_json(path).map_err(|e| {
            eprintln!("Error loading {}: {}", what, e);
            e.exit_code() as u8
        })
    })
    .transpose()
}

/// Serialize `value` and write it to `output` or stdout.
fn emit(value: &Value, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let json_output = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;

    match output {
        Some(path) => {
            std::fs::write(&path, &json_output).map_err(|e| {
                eprintln!("Error writing to {}: {}", path.display(), e);
                3u8
            })?;
        }
        None => {
            println!("{}", json_output);
        }
    }

    Ok(())
}

fn run_resolve(
    schema_source: &str,
    data: Option<&Path>,
    all_refs: bool,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let schema = load_json_auto(schema_source).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;
    let data = load_optional(data, "data")?;

    let resolved = if all_refs {
        let validator = JsonSchemaValidator;
        SchemaResolver::new(&schema, &validator).resolve_all_refs(&schema)
    } else {
        resolve(&schema, &schema, data.as_ref())
    }
    .map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    emit(&resolved, output, pretty)
}

fn run_render(inputs: FormInputs, output: Option<PathBuf>, pretty: bool) -> Result<(), u8> {
    let mut form = inputs.build()?;
    let tree = form.render();
    let tree = serde_json::to_value(&tree).map_err(|e| {
        eprintln!("Error serializing output: {}", e);
        2u8
    })?;
    emit(&tree, output, pretty)
}

fn run_validate(data_path: &Path, schema_source: &str, json_output: bool) -> Result<(), u8> {
    let data = load_json(data_path).map_err(|e| {
        report_error(json_output, &format!("loading data: {}", e));
        e.exit_code() as u8
    })?;
    let schema = load_json_auto(schema_source).map_err(|e| {
        report_error(json_output, &format!("loading schema: {}", e));
        e.exit_code() as u8
    })?;

    match validate_form_data(&JsonSchemaValidator, &schema, &data) {
        Ok(()) => {
            if json_output {
                println!(r#"{{"valid":true}}"#);
            } else {
                println!("Valid");
            }
            Ok(())
        }
        Err(ValidateError::Invalid { errors }) => {
            if json_output {
                let output = json!({
                    "valid": false,
                    "errors": errors
                });
                println!("{}", output);
            } else {
                eprintln!("Validation failed:");
                for error in errors {
                    eprintln!("  {}", error);
                }
            }
            Err(1)
        }
        Err(ValidateError::Resolve(e)) => {
            report_error(json_output, &e.to_string());
            Err(e.exit_code() as u8)
        }
    }
}

/// Output an error message in plain text or JSON format.
fn report_error(json_output: bool, msg: &str) {
    if json_output {
        println!("{}", json!({ "valid": false, "error": msg }));
    } else {
        eprintln!("Error: {}", msg);
    }
}

fn run_mutate(
    inputs: FormInputs,
    op: Option<String>,
    path: &str,
    action: Option<String>,
    output: Option<PathBuf>,
    pretty: bool,
) -> Result<(), u8> {
    let action = match (op, action) {
        (Some(op), _) => {
            let operation = ArrayOperation::parse(&op).ok_or_else(|| {
                eprintln!(
                    "Error: invalid operation '{}' (expected insert, insert:<i>, remove:<i>, copy:<i> or move:<i>:<j>)",
                    op
                );
                2u8
            })?;
            FormAction::Array {
                path: pointer_to_path(path),
                operation,
            }
        }
        (None, Some(action)) => serde_json::from_str::<FormAction>(&action).map_err(|e| {
            eprintln!("Error: invalid action: {}", e);
            2u8
        })?,
        (None, None) => {
            eprintln!("Error: one of --op or --action is required");
            return Err(2);
        }
    };

    let mut form = inputs.build()?;
    let change = form.apply(action).map_err(|e| {
        eprintln!("Error: {}", e);
        e.exit_code() as u8
    })?;

    let result = json!({
        "change": change,
        "formData": form.data(),
    });
    emit(&result, output, pretty)
}

fn run_lint(schema: &Path, ui: Option<&Path>, format: &str, strict: bool) -> Result<(), u8> {
    if !schema.exists() {
        eprintln!("Error: path not found: {}", schema.display());
        return Err(2);
    }

    let result = lint_files(schema, ui, &Registry::new());

    if format == "json" {
        let json_output = serde_json::to_string_pretty(&result).map_err(|e| {
            eprintln!("Error serializing output: {}", e);
            2u8
        })?;
        println!("{}", json_output);
    } else {
        let status_icon = match result.status {
            LintStatus::Ok => "\x1b[32m✓\x1b[0m",
            LintStatus::Warning => "\x1b[33m⚠\x1b[0m",
            LintStatus::Error => "\x1b[31m✗\x1b[0m",
        };
        println!("  {} {}", status_icon, schema.display());

        for diag in &result.diagnostics {
            let (color, label) = match diag.severity {
                Severity::Error => ("\x1b[31m", "error"),
                Severity::Warning => ("\x1b[33m", "warning"),
            };
            println!(
                "    {}{}[{}]\x1b[0m: {} - {}",
                color, label, diag.code, diag.path, diag.message
            );
        }

        println!();
        if result.is_ok(strict) {
            println!("\x1b[32m✓ all checks passed\x1b[0m");
        } else {
            println!(
                "\x1b[31m✗ {} errors, {} warnings\x1b[0m",
                result.errors, result.warnings
            );
        }
    }

    if result.is_ok(strict) {
        Ok(())
    } else {
        Err(1)
    }
}
