use clap::{Parser, Subcommand};
use hnswam_core::config;
use hnswam_core::{validate_options, HnswIndex, IndexOptions, TupleId};
use std::collections::HashSet;
use std::fs::File;
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hnswam", about = "Build, query and maintain HNSW index files")]
struct Args {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an index from a vector file (u32 count, u32 dim, then f32 data)
    Build {
        /// Input vector file; row i gets tuple id i
        #[arg(short, long)]
        input: PathBuf,

        /// Index file to create
        #[arg(short, long)]
        output: PathBuf,

        /// Links per node on upper layers (layer 0 holds twice as many)
        #[arg(short, long, default_value_t = config::HNSW_DEFAULT_M)]
        m: usize,

        /// Candidate list size during construction
        #[arg(long, default_value_t = config::HNSW_DEFAULT_EF_CONSTRUCTION)]
        ef_construction: usize,

        /// Distance metric: l2, inner_product (ip) or cosine
        #[arg(long, default_value = "l2")]
        metric: String,

        /// Seed for layer assignment
        #[arg(long, default_value_t = config::HNSW_DEFAULT_SEED)]
        seed: u64,

        /// Take the closest neighbors instead of the diversity heuristic
        #[arg(long, default_value_t = false)]
        no_heuristic: bool,
    },

    /// Print the k nearest tuples for one vector or a file of queries
    Query {
        #[arg(short, long)]
        index: PathBuf,

        /// Comma-separated query vector, e.g. "0.5,1,-2"
        #[arg(long, conflicts_with = "queries")]
        vector: Option<String>,

        /// Query vector file in the build input format
        #[arg(long)]
        queries: Option<PathBuf>,

        #[arg(short, default_value_t = 10)]
        k: usize,

        /// Search beam width (raised to k when smaller)
        #[arg(long, default_value_t = config::HNSW_DEFAULT_EF_SEARCH)]
        ef: usize,

        /// Compare against exact search and print Recall@k
        #[arg(long, default_value_t = false)]
        recall: bool,
    },

    /// Tombstone tuples by id
    Delete {
        #[arg(short, long)]
        index: PathBuf,

        /// Comma-separated tuple ids
        #[arg(long, value_delimiter = ',', required = true)]
        tuples: Vec<u64>,

        /// Run vacuum right after deleting
        #[arg(long, default_value_t = false)]
        vacuum: bool,
    },

    /// Repair neighbor lists and reclaim tombstoned nodes
    Vacuum {
        #[arg(short, long)]
        index: PathBuf,
    },

    /// Print index statistics
    Stats {
        #[arg(short, long)]
        index: PathBuf,

        /// Emit JSON instead of text
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

/// Read a vector file: u32 count, u32 dim, then count × dim little-endian f32.
fn read_vectors(path: &Path) -> Result<(usize, Vec<Vec<f32>>), Box<dyn std::error::Error>> {
    let mut buf = Vec::new();
    File::open(path)?.read_to_end(&mut buf)?;
    if buf.len() < 8 {
        return Err(format!("{}: missing header", path.display()).into());
    }
    let count = u32::from_le_bytes(buf[0..4].try_into()?) as usize;
    let dim = u32::from_le_bytes(buf[4..8].try_into()?) as usize;
    if dim == 0 {
        return Err(format!("{}: zero dimension", path.display()).into());
    }
    let data = &buf[8..];
    if data.len() != count * dim * 4 {
        return Err(format!(
            "{}: expected {} vectors of {} floats, found {} bytes",
            path.display(),
            count,
            dim,
            data.len()
        )
        .into());
    }
    let vectors = data
        .chunks_exact(dim * 4)
        .map(|row| {
            row.chunks_exact(4)
                .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect()
        })
        .collect();
    Ok((dim, vectors))
}

fn parse_vector(text: &str) -> Result<Vec<f32>, Box<dyn std::error::Error>> {
    text.split(',')
        .map(|x| {
            x.trim().parse::<f32>().map_err(|e| -> Box<dyn std::error::Error> {
                format!("bad component '{x}': {e}").into()
            })
        })
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = EnvFilter::from_default_env()
        .add_directive("hnswam_core=info".parse().expect("valid directive literal"))
        .add_directive("hnswam_cli=info".parse().expect("valid directive literal"));
    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match args.command {
        Command::Build {
            input,
            output,
            m,
            ef_construction,
            metric,
            seed,
            no_heuristic,
        } => {
            let options = IndexOptions {
                random_seed: seed,
                heuristic: !no_heuristic,
                ..validate_options(m, ef_construction, &metric)?
            };
            let (dim, vectors) = read_vectors(&input)?;
            tracing::info!("Loaded {} vectors x {}d from {:?}", vectors.len(), dim, input);

            let t0 = Instant::now();
            let rows = vectors.iter().enumerate().map(|(i, v)| (TupleId(i as u64), v));
            let (_, result) = HnswIndex::build(&output, options, dim, rows)?;
            let secs = t0.elapsed().as_secs_f64();
            println!(
                "Built {:?}: {} nodes, {} pages in {:.2}s ({:.0} vec/s)",
                output,
                result.node_count,
                result.page_count,
                secs,
                result.node_count as f64 / secs.max(f64::EPSILON)
            );
        }

        Command::Query {
            index,
            vector,
            queries,
            k,
            ef,
            recall,
        } => {
            let idx = HnswIndex::open(&index)?;
            let queries = match (vector, queries) {
                (Some(text), _) => vec![parse_vector(&text)?],
                (None, Some(path)) => read_vectors(&path)?.1,
                (None, None) => return Err("pass --vector or --queries".into()),
            };

            let t0 = Instant::now();
            let mut total_recall = 0.0f64;
            for (qi, q) in queries.iter().enumerate() {
                let scan = idx.begin_scan(q, k, ef)?;
                let items: Vec<_> = scan.collect();
                if recall {
                    let exact: HashSet<TupleId> =
                        idx.brute_force(q, k)?.iter().map(|h| h.tuple).collect();
                    let found = items.iter().filter(|it| exact.contains(&it.tuple)).count();
                    total_recall += found as f64 / exact.len().max(1) as f64;
                } else {
                    for item in &items {
                        println!("{qi}\t{}\t{:.6}", item.tuple, item.distance);
                    }
                }
            }
            let elapsed = t0.elapsed();
            if recall {
                println!(
                    "Recall@{k}: {:.4} over {} queries ({:.1} QPS incl. exact scan)",
                    total_recall / queries.len().max(1) as f64,
                    queries.len(),
                    queries.len() as f64 / elapsed.as_secs_f64().max(f64::EPSILON)
                );
            }
        }

        Command::Delete {
            index,
            tuples,
            vacuum,
        } => {
            let idx = HnswIndex::open(&index)?;
            let doomed: HashSet<u64> = tuples.into_iter().collect();
            let stats = idx.bulk_delete(|t| doomed.contains(&t.0))?;
            println!(
                "Tombstoned {} tuple(s), {} live",
                stats.tuples_removed, stats.num_index_tuples
            );
            if vacuum {
                let v = idx.vacuum_cleanup()?;
                println!(
                    "Vacuum: reclaimed {} node(s), repaired {} list(s), {} pages",
                    v.nodes_reclaimed, v.lists_repaired, v.num_pages
                );
            }
        }

        Command::Vacuum { index } => {
            let idx = HnswIndex::open(&index)?;
            let v = idx.vacuum_cleanup()?;
            println!(
                "Vacuum: reclaimed {} node(s), repaired {} list(s) ({} short), {} live, {} pages",
                v.nodes_reclaimed, v.lists_repaired, v.short_lists, v.num_index_tuples, v.num_pages
            );
        }

        Command::Stats { index, json } => {
            let stats = HnswIndex::open(&index)?.stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("index:        {:?}", index);
                println!("dimensions:   {}", stats.dimensions);
                println!("metric:       {}", stats.options.metric);
                println!("M:            {}", stats.options.m);
                println!("ef_construct: {}", stats.options.ef_construction);
                println!(
                    "nodes:        {} ({} live, {} tombstoned)",
                    stats.node_count, stats.live_count, stats.tombstones
                );
                println!(
                    "max layer:    {}",
                    stats.max_layer.map_or("-".to_string(), |l| l.to_string())
                );
                println!("pages:        {}", stats.page_count);
            }
        }
    }

    Ok(())
}
