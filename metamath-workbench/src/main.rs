//! Command-line front end of the Metamath proof database engine.  Loads a
//! database, then runs the checks and queries selected by the flags; the
//! `metamath_core::service` module does the actual work.

use annotate_snippets::Renderer;
use metamath_core::database::{Database, DbOptions};
use metamath_core::diag::{DetailedError, Diagnostic};
use metamath_core::outline::HeaderPath;
use metamath_core::progress::Reporter;
use metamath_core::search::SearchParameters;
use metamath_core::service::{HeaderContent, Workbench};
use simple_logger::SimpleLogger;
use std::fs;
use std::process::ExitCode;

/// A Metamath proof database engine
#[derive(Debug, clap::Parser)]
#[command(version, about, verbatim_doc_comment)]
struct Cli {
    /// Database file to load
    #[arg(id("DATABASE"))]
    db: String,
    /// Prints milliseconds after each stage
    #[arg(long = "time")]
    timing: bool,
    /// Checks proof validity, and parses all statements with the grammar
    #[arg(short, long)]
    verify: bool,
    /// Lists one level of the header tree; an empty path lists the top level
    #[arg(short = 'H', long, value_name("PATH"))]
    header: Option<String>,
    /// Shows an axiom or theorem with its proof and dependencies
    #[arg(short, long, value_name("LABEL"))]
    theorem: Option<String>,
    /// Shows all proof steps, including the syntax steps
    #[arg(long)]
    all_steps: bool,
    /// Lists the assertions whose label contains TEXT
    #[arg(short, long, value_name("TEXT"))]
    search: Option<String>,
    /// Page of the search results to show, starting at 0
    #[arg(long, default_value_t = 0)]
    page: usize,
    /// Finds labels matching QUERY, the exact match first
    #[arg(short, long, value_name("QUERY"))]
    quick: Option<String>,
    /// Writes an axiom or theorem as a proof worksheet
    #[arg(short, long, value_name("LABEL"))]
    export: Option<String>,
    /// Checks a proof worksheet against the database
    #[arg(long, value_name("FILE"))]
    validate: Option<String>,
    /// Adds the content of a proof worksheet to the database file
    #[arg(short, long, value_name("FILE"))]
    add: Option<String>,
    /// Dumps typesetting information
    #[arg(short = 'T', long)]
    dump_typesetting: bool,
    /// Activates debug logs, including for the grammar building and statement parsing
    #[arg(long)]
    debug: bool,
    /// Logs statements as they are reparsed after an insertion
    #[arg(long)]
    trace_recalc: bool,
    /// Number of threads to use for verification
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    jobs: Option<u32>,
}

/// Prints a positioned error on `source`, returning 1 if it is an error and
/// 0 for a warning.
fn print_error(renderer: &Renderer, err: &DetailedError, source: &str, origin: &str) -> usize {
    err.render(source, origin, |msg| println!("{}", renderer.render(msg)));
    usize::from(err.diagnostic.is_error())
}

fn print_diagnostic(diag: &Diagnostic) -> usize {
    println!("{diag}");
    usize::from(diag.is_error())
}

fn verify(db: &mut Database, renderer: &Renderer, origin: &str) -> usize {
    let diags = db.diagnostics(&Reporter::none());
    diags
        .into_iter()
        .map(|(index, diag)| print_error(renderer, &db.detailed(index, diag), db.text(), origin))
        .sum()
}

fn print_header(workbench: &Workbench, path: &str) -> Result<(), Diagnostic> {
    let path = if path.is_empty() {
        HeaderPath(Vec::new())
    } else {
        path.parse()?
    };
    let header = workbench.get_header(&path)?;
    println!("{}", header.title);
    if !header.description.is_empty() {
        println!("\n{}\n", header.description);
    }
    for content in &header.content_titles {
        match content {
            HeaderContent::Comment(text) => println!("  $( {} $)", text.lines().next().unwrap_or("")),
            HeaderContent::Constants(symbols) => println!("  $c {} $.", symbols.join(" ")),
            HeaderContent::Variables(symbols) => println!("  $v {} $.", symbols.join(" ")),
            HeaderContent::FloatingHypothesis(float) => {
                println!("  {} $f {} {} $.", float.label, float.typecode, float.variable);
            }
            HeaderContent::Assertion { label, kind } => println!("  {label} ({kind:?})"),
        }
    }
    for (index, title) in header.subheader_titles.iter().enumerate() {
        let mut child = path.clone();
        child.0.push(index + 1);
        println!("{child} {title}");
    }
    Ok(())
}

fn print_theorem(workbench: &mut Workbench, label: &str, all_steps: bool) -> Result<usize, Diagnostic> {
    let page = workbench.get_theorem_page(label, all_steps)?;
    let theorem = &page.theorem;
    println!("{} {} ({:?})", theorem.theorem_number, theorem.label, theorem.kind);
    if let Some(description) = &theorem.description {
        println!("{description}");
    }
    for hyp in &theorem.hypotheses {
        println!("  hyp  {hyp}");
    }
    println!("  {}", theorem.assertion);
    for line in &page.proof_lines {
        let hyps = line.hypotheses.iter().map(ToString::to_string).collect::<Vec<_>>();
        println!(
            "{:>4} {:>8} {:<12}{}{}",
            line.step,
            hyps.join(","),
            line.label,
            ". ".repeat(line.indentation.saturating_sub(1)),
            line.expression
        );
    }
    println!("axioms: {}", page.axiom_dependencies.join(" "));
    println!("definitions: {}", page.definition_dependencies.join(" "));
    println!("referenced by: {}", page.references.join(" "));
    println!(
        "previous: {}, next: {}",
        page.previous_label.as_deref().unwrap_or("-"),
        page.next_label.as_deref().unwrap_or("-")
    );
    Ok(page.proof_error.as_ref().map_or(0, print_diagnostic))
}

fn print_search(workbench: &mut Workbench, label: &str, page: usize) -> Result<(), Diagnostic> {
    let params = SearchParameters {
        label: label.to_owned(),
        page,
        ..SearchParameters::default()
    };
    let result = workbench.search_theorems(&params)?;
    for entry in &result.entries {
        println!("{:>6} {} {}", entry.theorem_number, entry.label, entry.assertion);
    }
    println!("page {} of {}", page + 1, result.page_count);
    Ok(())
}

fn main() -> ExitCode {
    let cli = <Cli as clap::Parser>::parse();
    let options = DbOptions {
        timing: cli.timing,
        trace_recalc: cli.trace_recalc,
        jobs: cli.jobs.unwrap_or(1) as usize,
        ..DbOptions::default()
    };

    if cli.debug || cli.timing {
        if let Err(err) = SimpleLogger::new().init() {
            eprintln!("{err}");
        }
    }

    let renderer = Renderer::styled();
    let mut workbench = Workbench::new(options);
    if let Err(err) = workbench.load_database(&cli.db) {
        let source = fs::read_to_string(&cli.db).unwrap_or_default();
        print_error(&renderer, &err, &source, &cli.db);
        return ExitCode::FAILURE;
    }

    let mut count = 0;
    if cli.verify {
        if let Ok(db) = workbench.database() {
            let mut db = db.clone();
            count += verify(&mut db, &renderer, &cli.db);
        }
    }

    if let Some(path) = &cli.header {
        if let Err(diag) = print_header(&workbench, path) {
            count += print_diagnostic(&diag);
        }
    }

    if let Some(label) = &cli.theorem {
        match print_theorem(&mut workbench, label, cli.all_steps) {
            Ok(errors) => count += errors,
            Err(diag) => count += print_diagnostic(&diag),
        }
    }

    if let Some(label) = &cli.search {
        if let Err(diag) = print_search(&mut workbench, label, cli.page) {
            count += print_diagnostic(&diag);
        }
    }

    if let Some(query) = &cli.quick {
        match workbench.quick_search(query, true) {
            Ok((labels, more)) => {
                println!("{}{}", labels.join(" "), if more { " ..." } else { "" });
            }
            Err(diag) => count += print_diagnostic(&diag),
        }
    }

    if let Some(label) = &cli.export {
        match workbench.get_theorem_mmp_format(label) {
            Ok(worksheet) => print!("{worksheet}"),
            Err(diag) => count += print_diagnostic(&diag),
        }
    }

    if let Some(file) = &cli.validate {
        match fs::read_to_string(file) {
            Ok(text) => match workbench.validate_worksheet(&text) {
                Ok(errors) => {
                    for err in &errors {
                        count += print_error(&renderer, err, &text, file);
                    }
                }
                Err(diag) => count += print_diagnostic(&diag),
            },
            Err(err) => count += print_diagnostic(&err.into()),
        }
    }

    if let Some(file) = &cli.add {
        let added = fs::read_to_string(file)
            .map_err(Diagnostic::from)
            .and_then(|text| workbench.add_to_database(&text));
        match added {
            Ok(inserted_at) => println!("added {inserted_at:?}"),
            Err(diag) => count += print_diagnostic(&diag),
        }
    }

    if cli.dump_typesetting {
        match workbench.get_html_representations() {
            Ok(markup) => {
                for symbol in markup {
                    println!(
                        "{}: html {:?}, althtml {:?}, latex {:?}",
                        symbol.symbol, symbol.html, symbol.alt_html, symbol.latex
                    );
                }
            }
            Err(diag) => count += print_diagnostic(&diag),
        }
    }

    println!("{count} errors issued.");
    if count > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
