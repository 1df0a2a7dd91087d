use clap::{Parser, Subcommand};
use runtime_perf_harness::benches::{fibonacci, file_io, http, matrix, memory, Emitter, OutputFormat};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Subcommand, Debug)]
enum Command {
    /// Recursive and iterative Fibonacci.
    Fibonacci {
        #[arg(default_value_t = fibonacci::DEFAULT_N)]
        n: u32,
    },

    /// Dense NxN matrix multiplication.
    Matrix {
        #[arg(default_value_t = matrix::DEFAULT_SIZE)]
        size: usize,

        /// Seed for the random input matrices.
        #[arg(long, default_value_t = 0)]
        seed: u64,

        /// Run the naive product even above the size cutoff.
        #[arg(long, default_value_t = false)]
        force_manual: bool,
    },

    /// Large array allocation and summation.
    Memory {
        #[arg(default_value_t = memory::DEFAULT_ARRAY_SIZE)]
        array_size: usize,

        /// Release the array and report memory before exiting.
        #[arg(long, default_value_t = false)]
        reclaim: bool,
    },

    /// Sequential write then read of a scratch file.
    FileIo {
        #[arg(default_value_t = file_io::DEFAULT_SIZE_MB)]
        size_mb: u64,

        #[arg(default_value_t = file_io::DEFAULT_CHUNK_MB)]
        chunk_mb: u64,

        /// Scratch file location; removed when the run ends.
        #[arg(long, value_name = "FILE", default_value = file_io::DEFAULT_SCRATCH_FILE)]
        path: PathBuf,

        /// Skip the page-cache drop between the phases.
        #[arg(long, default_value_t = false)]
        no_drop_cache: bool,
    },

    /// Interactive HTTP server; runs until killed.
    Http {
        #[arg(default_value = http::DEFAULT_HOST)]
        host: String,

        #[arg(default_value_t = http::DEFAULT_PORT)]
        port: u16,
    },
}

#[derive(Parser, Debug)]
#[command(name = "perf-payload")]
#[command(about = "Native workloads printing perf-harness metric lines")]
#[command(version)]
struct Args {
    /// Line contract to print.
    #[arg(long, value_enum, default_value_t = OutputFormat::Legacy, global = true)]
    format: OutputFormat,

    #[command(subcommand)]
    cmd: Command,
}

fn run(args: Args) -> io::Result<()> {
    let mut stdout = io::stdout().lock();
    let mut stderr = io::stderr();
    let mut out = Emitter::new(&mut stdout, &mut stderr, args.format);

    match args.cmd {
        Command::Fibonacci { n } => fibonacci::run(&mut out, n),
        Command::Matrix {
            size,
            seed,
            force_manual,
        } => matrix::run(&mut out, size, seed, force_manual),
        Command::Memory {
            array_size,
            reclaim,
        } => memory::run(&mut out, array_size, reclaim),
        Command::FileIo {
            size_mb,
            chunk_mb,
            path,
            no_drop_cache,
        } => {
            let fio = file_io::FileIoArgs {
                size_mb,
                chunk_mb,
                path,
                drop_cache: !no_drop_cache,
            };
            file_io::run(&mut out, &fio).map(|_| ())
        }
        Command::Http { host, port } => {
            let server = http::HttpServer::bind(&host, port)?;
            let addr = server.local_addr()?;
            out.line(format!("启动 HTTP 服务器 http://{addr}"))?;
            out.line("路径:")?;
            out.line("  / - 简单消息")?;
            out.line("  /json - JSON响应")?;
            out.line("  /stats - 服务器统计")?;
            out.line("使用 Ctrl+C 停止服务器")?;
            server.serve(None)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    match run(Args::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("perf-payload: {e}");
            ExitCode::FAILURE
        }
    }
}
