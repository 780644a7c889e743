use tracing::info;
use tracing_subscriber::EnvFilter;

use arbor::datatype::Value;
use arbor::grid::Grid;
use arbor::settings::Settings;
use arbor::tree::Tree;

fn main() -> arbor::Result<()> {
    let settings = Settings::load(Some("arbor"))?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log.filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let codec = settings.codec()?;

    let mut quotes = Grid::new(1, 4)?;
    quotes.set_headers(["ticker", "close", "high", "low"])?;
    quotes.set_labels(["20240131"])?;
    quotes.set_row(0, [Value::from("IBM"), 55.6.into(), 58.0.into(), 54.3.into()])?;

    let tree = Tree::new();
    let root = tree.create_root("")?;
    tree.put_var_at_path(root, "market/equities/quotes", quotes)?;
    tree.put_var_at_path(root, "market/\"fx/rates\"/EURUSD", 1.0842)?;

    let equities = tree
        .node_at_path(root, "/market/equities")?
        .ok_or_else(|| arbor::ArborError::NotFound("market/equities".into()))?;
    info!(path = %tree.path_of(equities)?, nodes = tree.len(), "tree assembled");

    let text = tree.encode_subtree_with(root, &codec)?;
    println!("{text}");
    let copy = Tree::new();
    let restored = copy.decode_subtree(&text, None)?;
    info!(
        leaves = ?copy.unique_leaf_node_names(restored)?,
        "subtree restored from {} bytes",
        text.len()
    );
    Ok(())
}
