//! Control-plane settings that EKS manages on the customer's behalf
//!
//! None of these can be inspected or changed by the operator, so each one is
//! not applicable with the reason attached.

use crate::context::CheckContext;
use crate::error::ControlError;
use futures::FutureExt;
use futures::future::{self, BoxFuture};
use kube_stig_core::Outcome;

type CheckFuture<'a> = BoxFuture<'a, Result<Outcome, ControlError>>;

fn justified<'a>(justification: &'static str) -> CheckFuture<'a> {
    future::ready(Ok(Outcome::not_applicable(justification))).boxed()
}

/// V-242382
pub fn api_server_authorization_mode(_ctx: &CheckContext) -> CheckFuture<'_> {
    justified(
        "The kube-apiserver is AWS-managed, so --authorization-mode cannot be set. Whichever \
         authentication mode maps IAM principals (aws-auth ConfigMap or access entries), \
         authorization is enforced by the Node and RBAC authorizers.",
    )
}

/// V-242384
pub fn scheduler_binding(_ctx: &CheckContext) -> CheckFuture<'_> {
    justified(
        "The scheduler's --bind-address is configured by the EKS-managed control plane. The \
         insecure port 10251 has been removed; health and metrics use the secure port 10259.",
    )
}

/// V-242385
pub fn controller_manager_binding(_ctx: &CheckContext) -> CheckFuture<'_> {
    justified(
        "The controller manager runs inside an AWS-managed VPC; its manifest and --bind-address \
         are not accessible and its endpoint is not exposed.",
    )
}

/// V-242388
pub fn insecure_bind_address(_ctx: &CheckContext) -> CheckFuture<'_> {
    justified(
        "EKS exposes only the managed HTTPS API endpoint; --insecure-bind-address and \
         --insecure-port are configured by the managed control plane.",
    )
}

/// V-242389
pub fn secure_port(_ctx: &CheckContext) -> CheckFuture<'_> {
    justified(
        "The API is served from an AWS-managed HTTPS endpoint on port 443 enforcing TLS 1.2 or \
         newer; --secure-port is configured by the managed control plane.",
    )
}

/// V-242418
pub fn tls_cipher_suites(_ctx: &CheckContext) -> CheckFuture<'_> {
    justified(
        "--tls-cipher-suites cannot be set on the AWS-managed kube-apiserver; cipher selection \
         for the EKS endpoint is enforced by AWS.",
    )
}

/// V-245542
pub fn basic_auth_file(_ctx: &CheckContext) -> CheckFuture<'_> {
    justified(
        "EKS authenticates through IAM webhook tokens, service account tokens and OIDC; static \
         basic authentication (--basic-auth-file) cannot be enabled.",
    )
}

/// V-245543
pub fn token_auth_file(_ctx: &CheckContext) -> CheckFuture<'_> {
    justified(
        "EKS authenticates through IAM webhook tokens, service account tokens and OIDC; static \
         token files (--token-auth-file) cannot be enabled.",
    )
}
