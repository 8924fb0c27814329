use serde::{Deserialize, Serialize};

fn default_kubectl() -> String {
    "kubectl".into()
}

fn default_helm() -> String {
    "helm".into()
}

fn default_docker() -> String {
    "docker".into()
}

/// External binaries driven by the CLI resource client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_kubectl")]
    pub kubectl: String,
    #[serde(default = "default_helm")]
    pub helm: String,
    #[serde(default = "default_docker")]
    pub docker: String,
    /// kubeconfig context passed to kubectl and helm; current context when unset
    #[serde(default)]
    pub kube_context: Option<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            kubectl: default_kubectl(),
            helm: default_helm(),
            docker: default_docker(),
            kube_context: None,
        }
    }
}
