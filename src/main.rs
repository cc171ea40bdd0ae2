use std::io::Write;

use jetdb::{
    Database, DatabaseOptions,
    index::page::IndexPage,
    storage::usage_map::{UsageMap, UsageMapLocation},
    types::{
        PageNumber,
        error::DatabaseError,
        page::{DataPage, PageType},
    },
};
use rustyline::{DefaultEditor, error::ReadlineError};
use tracing_subscriber::EnvFilter;

const HELP: &str = r#"
Available commands:
  header             - Show the database header
  page <n>           - Dump page n
  umap <page> <row>  - Show the usage map stored at page/row
  free               - List pages in the global usage map
  tree <root>        - Walk the index tree rooted at page <root>
  help, h            - Show this help message
  clear, ctrl + l    - Clear the screen
  exit, quit, q      - Exit
"#;

fn parse_page(argument: Option<&str>) -> Option<PageNumber> {
    argument.and_then(|value| value.parse().ok())
}

fn show_page(database: &Database, page_number: PageNumber) -> Result<(), DatabaseError> {
    let format = database.format();
    let bytes = database.channel().borrow_mut().read_page(page_number)?;
    match PageType::from_u8(bytes[0]) {
        Ok(PageType::Data) => {
            let page = DataPage::from_bytes(&bytes, page_number, format)?;
            println!(
                "page {}: data, owner {}, {} rows, {} bytes free",
                page_number,
                page.owner,
                page.row_count(),
                page.free_space(format)
            );
            for (row_number, row) in page.rows.iter().enumerate() {
                let flags = if row.deleted { " (deleted)" } else { "" };
                println!("  row {}: {} bytes{}", row_number, row.data.len(), flags);
            }
        }
        Ok(PageType::IndexLeaf | PageType::IndexNode) => {
            let page = IndexPage::from_bytes(&bytes, page_number, format)?;
            println!(
                "page {}: {}, owner {}, prev {}, next {}, tail {}",
                page_number,
                page.page_type().name(),
                page.owner,
                page.prev_page,
                page.next_page,
                page.child_tail_page
            );
            for (position, entry) in page.entries.iter().enumerate() {
                match page.children.get(position) {
                    Some(child) => println!("  {} [child {}]", entry, child),
                    None => println!("  {}", entry),
                }
            }
        }
        Ok(page_type) => println!("page {}: {}", page_number, page_type.name()),
        Err(_) => println!("page {}: unknown type 0x{:02x}", page_number, bytes[0]),
    }
    Ok(())
}

fn show_tree(database: &Database, root: PageNumber, depth: usize) -> Result<(), DatabaseError> {
    let format = database.format();
    let bytes = database.channel().borrow_mut().read_page(root)?;
    let page = IndexPage::from_bytes(&bytes, root, format)?;
    let indent = "  ".repeat(depth);
    println!(
        "{}{} {} ({} entries)",
        indent,
        page.page_type().name(),
        root,
        page.entries.len()
    );
    if !page.is_leaf {
        for child in page.children.clone() {
            show_tree(database, child, depth + 1)?;
        }
    }
    Ok(())
}

fn process_command(database: &Database, command: &str) -> Result<bool, DatabaseError> {
    let mut parts = command.split_whitespace();
    let Some(name) = parts.next() else {
        return Ok(true);
    };

    match name.to_lowercase().as_str() {
        "exit" | "quit" | "q" => {
            println!("Goodbye!");
            return Ok(false);
        }
        "help" | "h" => println!("{}", HELP),
        "clear" => {
            print!("\x1B[2J\x1B[1;1H");
            let _ = std::io::stdout().flush();
        }
        "header" => {
            let header = database.header();
            println!("format:     {:?}", header.file_format);
            println!("sort order: 0x{:04x}", header.sort_order);
            println!("page size:  {}", database.format().page_size);
            println!("pages:      {}", database.page_count());
        }
        "page" => match parse_page(parts.next()) {
            Some(page_number) => show_page(database, page_number)?,
            None => println!("usage: page <n>"),
        },
        "umap" => match (parse_page(parts.next()), parts.next().and_then(|r| r.parse().ok())) {
            (Some(page_number), Some(row_number)) => {
                let location = UsageMapLocation::new(page_number, row_number);
                let channel = database.channel();
                let map = UsageMap::read(&mut channel.borrow_mut(), location, false)?;
                let kind = if map.is_inline() { "inline" } else { "reference" };
                let pages: Vec<String> = map.page_numbers().map(|p| p.to_string()).collect();
                println!("{} map, {} pages: [{}]", kind, map.len(), pages.join(", "));
            }
            _ => println!("usage: umap <page> <row>"),
        },
        "free" => {
            let pages: Vec<String> = database.free_pages().iter().map(|p| p.to_string()).collect();
            println!("free pages: [{}]", pages.join(", "));
        }
        "tree" => match parse_page(parts.next()) {
            Some(root) => show_tree(database, root, 0)?,
            None => println!("usage: tree <root>"),
        },
        other => println!("Unknown command: {} (try 'help')", other),
    }

    Ok(true)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: jetdb <file.mdb>");
        std::process::exit(2);
    };
    let database = Database::open(&path, DatabaseOptions::default().read_only(true))?;
    println!("Opened {} ({} pages). Type 'help' for commands.", path, database.page_count());

    let mut rl = DefaultEditor::new()?;
    loop {
        match rl.readline("jetdb> ") {
            Ok(line) => {
                let command = line.trim().to_string();
                if command.is_empty() {
                    continue;
                }
                rl.add_history_entry(&command)?;
                match process_command(&database, &command) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(error) => println!("Error: {}", error),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(error) => {
                println!("Error: {:?}", error);
                break;
            }
        }
    }

    database.close()?;
    Ok(())
}
