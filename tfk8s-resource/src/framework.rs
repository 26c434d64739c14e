use std::os::fd::{AsRawFd, FromRawFd};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use nix::unistd::{dup, dup2};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

use crate::schema::v0;

/// The outcome of an existence check that reached a verdict.
///
/// A check that could not decide, e.g. because the API server was
/// unreachable, is an `Err` rather than [`Existence::Absent`], so that the
/// caller does not forget a resource that may still be there.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Existence {
    Exists,
    Absent,
}

impl Existence {
    pub fn exists(self) -> bool {
        self == Existence::Exists
    }
}

impl From<bool> for Existence {
    fn from(exists: bool) -> Self {
        if exists {
            Existence::Exists
        } else {
            Existence::Absent
        }
    }
}

#[async_trait]
pub trait ResourceProvider: Send + Sync {
    async fn create(&self, request: v0::CreateResourceRequest) -> Result<v0::CreateResourceResponse>;

    async fn read(&self, request: v0::ReadResourceRequest) -> Result<v0::ReadResourceResponse>;

    async fn update(&self, request: v0::UpdateResourceRequest) -> Result<v0::UpdateResourceResponse>;

    async fn delete(&self, request: v0::DeleteResourceRequest) -> Result<v0::DeleteResourceResponse>;

    async fn exists(&self, request: v0::ExistsResourceRequest) -> Result<Existence>;

    async fn read_data_source(
        &self,
        request: v0::ReadDataSourceRequest,
    ) -> Result<v0::ReadDataSourceResponse> {
        bail!(
            "This provider does not implement data sources (requested: {})",
            request.type_
        )
    }
}

/// Route a request to the provider, turning a failure into an error response.
pub async fn dispatch<P: ResourceProvider + ?Sized>(
    provider: &P,
    request: v0::Request,
) -> v0::Response {
    let result = match request {
        v0::Request::Create(r) => {
            let type_ = r.type_.clone();
            provider
                .create(r)
                .await
                .with_context(|| format!("Could not create {} resource", type_))
                .map(v0::Response::Create)
        }
        v0::Request::Read(r) => {
            let type_ = r.resource.type_.clone();
            provider
                .read(r)
                .await
                .with_context(|| format!("Could not read {} resource", type_))
                .map(v0::Response::Read)
        }
        v0::Request::Update(r) => {
            let type_ = r.resource.type_.clone();
            provider
                .update(r)
                .await
                .with_context(|| format!("Could not update {} resource", type_))
                .map(v0::Response::Update)
        }
        v0::Request::Delete(r) => {
            let type_ = r.resource.type_.clone();
            provider
                .delete(r)
                .await
                .with_context(|| format!("Could not delete {} resource", type_))
                .map(v0::Response::Delete)
        }
        v0::Request::Exists(r) => {
            let type_ = r.resource.type_.clone();
            provider
                .exists(r)
                .await
                .with_context(|| format!("Could not check whether {} resource exists", type_))
                .map(|e| {
                    v0::Response::Exists(v0::ExistsResourceResponse { exists: e.exists() })
                })
        }
        v0::Request::ReadDataSource(r) => {
            let type_ = r.type_.clone();
            provider
                .read_data_source(r)
                .await
                .with_context(|| format!("Could not read {} data source", type_))
                .map(v0::Response::ReadDataSource)
        }
    };
    result.unwrap_or_else(error_response)
}

fn error_response(error: anyhow::Error) -> v0::Response {
    tracing::error!("{:?}", error);
    v0::Response::Error(v0::ErrorResponse {
        message: format!("{:#}", error),
    })
}

/// Serve requests from `input` until it is closed.
///
/// Each request and each response occupies exactly one line. Failures of
/// individual requests are reported in-band; only I/O errors on the streams
/// themselves end the loop early.
pub async fn serve<P, R, W>(provider: &P, input: R, mut output: W) -> Result<()>
where
    P: ResourceProvider + ?Sized,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = BufReader::new(input).lines();
    while let Some(line) = lines
        .next_line()
        .await
        .with_context(|| "Could not read line for request message")?
    {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<v0::Request>(&line) {
            Ok(request) => dispatch(provider, request).await,
            Err(e) => error_response(anyhow::Error::new(e).context("Could not parse request message")),
        };
        let mut bytes = serde_json::to_vec(&response)?;
        bytes.push(b'\n');
        output
            .write_all(&bytes)
            .await
            .with_context(|| "Could not write response message")?;
        output.flush().await?;
    }
    Ok(())
}

pub async fn run_main(provider: impl ResourceProvider) {
    let pipe = init_stdio()
        .map(pipe_fds_to_files)
        .with_context(|| "Could not set up the provider's standard streams")
        .unwrap_or_exit();

    serve(
        &provider,
        tokio::fs::File::from_std(pipe.in_),
        tokio::fs::File::from_std(pipe.out),
    )
    .await
    .unwrap_or_exit();
}

/// A pair of `T` values: one for input and one for output.
struct InOut<T> {
    in_: T,
    out: T,
}

/// A file descriptor
type Fd = i32;

/// Configure the standard input/output streams for the process.
/// This returns the protocol channels, and reconfigures the stdio file
/// descriptors as follows:
///
/// ```text
/// 0: /dev/null
/// 1: stderr
/// 2: stderr
/// ```
///
/// so that nothing but responses can end up on the protocol output.
fn init_stdio() -> Result<InOut<Fd>> {
    let r = InOut {
        in_: dup(0).with_context(|| "dup(0)")?,
        out: dup(1).with_context(|| "dup(1)")?,
    };

    // 0: dev/null
    {
        let dev_null =
            std::fs::File::open("/dev/null").with_context(|| "Could not open /dev/null")?;
        dup2(dev_null.as_raw_fd(), 0).with_context(|| "Could not dup2(/dev/null, 0)")?;
    }

    // 1: stderr
    dup2(2, 1).with_context(|| "Could not dup2(2, 1)")?;

    // 2: stderr is left as is

    Ok(r)
}

fn pipe_fds_to_files(pipe: InOut<Fd>) -> InOut<std::fs::File> {
    InOut {
        in_: unsafe { std::fs::File::from_raw_fd(pipe.in_) },
        out: unsafe { std::fs::File::from_raw_fd(pipe.out) },
    }
}

trait ProviderMainError<T> {
    type V;
    fn unwrap_or_exit(self) -> Self::V;
}
impl<T> ProviderMainError<Result<T>> for Result<T> {
    type V = T;
    fn unwrap_or_exit(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Error: {:?}", e);
                std::process::exit(1);
            }
        }
    }
}
