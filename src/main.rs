// Copyright 2024 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{Parser, Subcommand};
use pvc_autoscaler::build;
use pvc_autoscaler::config::Config;

#[derive(Parser)]
#[command(name = "pvc-autoscaler")]
#[command(about = "Grows PersistentVolumeClaims before they run out of space", long_about = None)]
#[command(version = build::PKG_VERSION, long_version = build::VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Output CRDs in YAML
    Crd {
        /// Optional output path. If not set, the output will be written to stdout.
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Default and validate a PersistentVolumeClaimAutoscaler manifest
    Validate {
        /// Manifest to check
        #[arg(short, long)]
        file: String,
    },

    /// Run the autoscaler
    Server {
        #[command(flatten)]
        config: Config,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crd { file } => pvc_autoscaler::crd(file).await?,
        Commands::Validate { file } => pvc_autoscaler::validate(file).await?,
        Commands::Server { config } => pvc_autoscaler::run(config).await?,
    }

    Ok(())
}
