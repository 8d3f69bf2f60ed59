//! The control catalog

use crate::control::Control;
use crate::error::ControlError;
use crate::{cluster, eks, managed, node};

/// Every control, in STIG id order within each group
pub fn catalog() -> Vec<Control> {
    vec![
        // Worker node
        Control::node("V-242387", "The Kubernetes Kubelet must have the \"readOnlyPort\" flag disabled.", 0.7, node::read_only_port),
        Control::node("V-242391", "The Kubernetes Kubelet must have anonymous authentication disabled.", 0.7, node::anonymous_auth),
        Control::node("V-242392", "The Kubernetes kubelet must enable explicit authorization.", 0.7, node::authorization_mode),
        Control::node("V-242396", "Kubernetes Kubectl cp command must give expected access and results.", 0.5, node::kubectl_version),
        Control::node("V-242397", "The Kubernetes kubelet staticPodPath must not enable static pods.", 0.7, node::static_pod_path),
        Control::node("V-242398", "Kubernetes DynamicAuditing must not be enabled.", 0.5, node::dynamic_auditing),
        Control::node("V-242399", "Kubernetes DynamicKubeletConfig must not be enabled.", 0.5, node::dynamic_kubelet_config),
        Control::node("V-242404", "Kubernetes Kubelet must deny hostname override.", 0.5, node::hostname_override),
        Control::node("V-242406", "The Kubernetes KubeletConfiguration file must be owned by root.", 0.5, node::config_ownership),
        Control::node("V-242407", "The Kubernetes KubeletConfiguration files must have file permissions set to 644 or more restrictive.", 0.5, node::config_permissions),
        Control::node("V-242424", "Kubernetes Kubelet must enable tlsPrivateKeyFile for client authentication to secure service.", 0.5, node::server_tls_bootstrap),
        Control::node("V-242425", "Kubernetes Kubelet must enable tlsCertFile for client authentication to secure service.", 0.5, node::server_tls_bootstrap),
        Control::node("V-242452", "The Kubernetes kubelet KubeConfig must have file permissions set to 644 or more restrictive.", 0.5, node::kubeconfig_permissions),
        Control::node("V-242453", "The Kubernetes kubelet KubeConfig file must be owned by root.", 0.5, node::kubeconfig_ownership),
        Control::node("V-242456", "The Kubernetes kubelet config must have file permissions set to 644 or more restrictive.", 0.5, node::config_permissions),
        Control::node("V-245541", "Kubernetes Kubelet must not disable timeouts.", 0.5, node::streaming_idle_timeout),
        Control::node("V-254801", "Kubernetes must enable PodSecurity admission controller on static pods and Kubelets.", 0.7, node::pod_security_gate),
        // Cluster, through kubectl
        Control::cluster("V-242383", "User-managed resources must be created in dedicated namespaces.", 0.7, cluster::user_resources_in_system_namespaces),
        Control::cluster("V-242395", "Kubernetes dashboard must not be enabled.", 0.5, cluster::dashboard_disabled),
        Control::cluster("V-242414", "The Kubernetes cluster must use non-privileged host ports for user pods.", 0.5, cluster::privileged_ports),
        Control::cluster("V-242415", "Secrets in Kubernetes must not be stored as environment variables.", 0.7, cluster::secrets_in_env),
        Control::cluster("V-242417", "Kubernetes must separate user functionality.", 0.5, cluster::user_pods_in_system_namespaces),
        Control::cluster("V-242442", "Kubernetes must remove old components after updated versions have been installed.", 0.5, cluster::stale_image_versions),
        Control::cluster("V-274884", "Kubernetes must limit Secret access on a need-to-know basis.", 0.5, cluster::secret_access_review),
        // Cluster, through the EKS API
        Control::cluster("V-242410", "The Kubernetes API Server must enforce ports, protocols, and services (PPS) that adhere to the Ports, Protocols, and Services Management Category Assurance List (PPSM CAL).", 0.5, eks::endpoint_access),
        Control::cluster("V-242427", "Kubernetes etcd must have a key file for secure communication.", 0.5, eks::secrets_encryption),
        Control::cluster("V-242428", "Kubernetes etcd must have a certificate for communication.", 0.5, eks::secrets_encryption),
        Control::cluster("V-242432", "Kubernetes etcd must have peer-cert-file set for secure communication.", 0.5, eks::secrets_encryption),
        Control::cluster("V-242443", "Kubernetes must contain the latest updates as authorized by IAVMs, CTOs, DTMs, and STIGs.", 0.5, eks::version_review),
        Control::cluster("V-242448", "The Kubernetes Kube Proxy kubeconfig must be owned by root.", 0.5, eks::kube_proxy_addon),
        Control::cluster("V-242461", "Kubernetes API Server audit logs must be enabled.", 0.5, eks::audit_logging),
        Control::cluster("V-242462", "The Kubernetes API Server must be set to audit log max size.", 0.5, eks::audit_logging),
        Control::cluster("V-242463", "The Kubernetes API Server must be set to audit log maximum backup.", 0.5, eks::audit_logging),
        Control::cluster("V-242464", "The Kubernetes API Server audit log retention must be set.", 0.5, eks::audit_logging),
        Control::cluster("V-242465", "The Kubernetes API Server audit log path must be set.", 0.5, eks::audit_logging),
        Control::cluster("V-254800", "Kubernetes must have a Pod Security Admission control file configured.", 0.7, eks::pod_security_admission),
        // Managed control plane
        Control::new("V-242382", "The Kubernetes API Server must enable Node,RBAC as the authorization mode.", 0.5, None, managed::api_server_authorization_mode),
        Control::new("V-242384", "The Kubernetes Scheduler must have secure binding.", 0.5, None, managed::scheduler_binding),
        Control::new("V-242385", "The Kubernetes Controller Manager must have secure binding.", 0.5, None, managed::controller_manager_binding),
        Control::cluster("V-242388", "The Kubernetes API server must have the insecure bind address not set.", 0.7, managed::insecure_bind_address),
        Control::cluster("V-242389", "The Kubernetes API server must have the secure port set.", 0.5, managed::secure_port),
        Control::new("V-242418", "The Kubernetes API server must use approved cipher suites.", 0.5, None, managed::tls_cipher_suites),
        Control::cluster("V-245542", "Kubernetes API Server must disable basic authentication to protect information in transit.", 0.7, managed::basic_auth_file),
        Control::new("V-245543", "Kubernetes API Server must disable token authentication to protect information in transit.", 0.7, None, managed::token_auth_file),
    ]
}

/// Restrict the catalog to the given ids, in catalog order
///
/// An empty selection keeps every control.
pub fn select(controls: Vec<Control>, ids: &[String]) -> Result<Vec<Control>, ControlError> {
    if ids.is_empty() {
        return Ok(controls);
    }
    if let Some(unknown) = ids
        .iter()
        .find(|id| !controls.iter().any(|c| c.id.eq_ignore_ascii_case(id)))
    {
        return Err(ControlError::UnknownControl(unknown.clone()));
    }
    Ok(controls
        .into_iter()
        .filter(|c| ids.iter().any(|id| c.id.eq_ignore_ascii_case(id)))
        .collect())
}
