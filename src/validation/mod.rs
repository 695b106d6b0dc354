/// MX-record verification: the [`MxResolver`](dnsmx::MxResolver) seam, its
/// trust-dns implementation and the timeout-bounded [`Verifier`](dnsmx::Verifier).
pub mod dnsmx;

/// Allowed TLDs, well-known providers and the disposable-domain blocklist.
pub mod policy;

/// Typo suggestions and domain autocompletion against well-known providers.
pub mod suggestion;

/// Structural and policy checks for a single address.
///
/// # Examples
/// ```
/// use email_gatekeeper::validation::syntax::Validator;
///
/// let validator = Validator::default();
/// assert!(validator.validate("abc@gmail.com").is_structurally_valid());
/// assert_eq!(validator.validate("user@mailinator.com").reason(), "disposable domain blocked");
/// assert_eq!(validator.validate("user@example.zz").reason(), "TLD not allowed");
/// ```
pub mod syntax;
