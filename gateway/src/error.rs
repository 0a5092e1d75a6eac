use serde::Serialize;

/// The error taxonomy surfaced by every store, pipeline, and forwarding
/// operation in the gateway. One variant per kind from the spec's error
/// taxonomy; each carries the context needed to render the
/// `{<type>: {message, code}}` wire shape downstream clients expect.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
	#[error("not found: {0}")]
	NotFound(String),
	#[error("pod not found: {0}")]
	PodNotFound(String),
	#[error("endpoint not available: {0}")]
	EndpointNotAvailable(String),
	#[error("endpoint not registered: {0}")]
	EndpointNotFound(String),
	#[error("conflict: {0}")]
	Conflict(String),
	#[error("invalid input: {0}")]
	InvalidInput(String),
	#[error("over quota: {0}")]
	OverQuota(OverQuotaKind),
	#[error("not authorized by policy: {0}")]
	PolicyNotAuthorized(String),
	#[error("service unavailable: {0}")]
	ServiceUnavailable(String),
	#[error("scheduler pod filter not found: {0}")]
	SchedulerPodFilterNotFound(String),
}

/// Sub-kinds of `GatewayError::OverQuota`, matched on separately from the
/// outer kind so call sites branch on "is this over quota" first and the
/// specific limit second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OverQuotaKind {
	#[error("too many files")]
	FileCount,
	#[error("file path too long")]
	FilePathLength,
	#[error("file content too large")]
	FileContentLength,
	#[error("too many metadata items")]
	MetadataItemCount,
}

impl GatewayError {
	/// The `<type>` key of the wire error envelope, per spec §6/§7.
	pub fn wire_type(&self) -> &'static str {
		match self {
			GatewayError::InvalidInput(_) => "badRequest",
			GatewayError::PolicyNotAuthorized(_) => "forbidden",
			GatewayError::NotFound(_) | GatewayError::PodNotFound(_) => "itemNotFound",
			GatewayError::Conflict(_) => "conflictingRequest",
			GatewayError::EndpointNotAvailable(_)
			| GatewayError::EndpointNotFound(_)
			| GatewayError::ServiceUnavailable(_)
			| GatewayError::SchedulerPodFilterNotFound(_) => "internalServerError",
			GatewayError::OverQuota(_) => "badRequest",
		}
	}

	/// The HTTP status this error renders as when returned from a handler.
	pub fn status_code(&self) -> u16 {
		match self {
			GatewayError::InvalidInput(_) | GatewayError::OverQuota(_) => 400,
			GatewayError::PolicyNotAuthorized(_) => 403,
			GatewayError::NotFound(_) | GatewayError::PodNotFound(_) => 404,
			GatewayError::Conflict(_) => 409,
			GatewayError::EndpointNotAvailable(_) | GatewayError::ServiceUnavailable(_) => 503,
			GatewayError::EndpointNotFound(_) | GatewayError::SchedulerPodFilterNotFound(_) => 500,
		}
	}

	/// Renders the `{<type>: {message, code}}` envelope from §6.
	pub fn to_wire(&self) -> WireError {
		WireError {
			wire_type: self.wire_type(),
			body: WireErrorBody {
				message: self.to_string(),
				code: self.status_code(),
			},
		}
	}
}

#[derive(Debug, Serialize)]
pub struct WireErrorBody {
	pub message: String,
	pub code: u16,
}

#[derive(Debug)]
pub struct WireError {
	pub wire_type: &'static str,
	pub body: WireErrorBody,
}

impl Serialize for WireError {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: serde::Serializer,
	{
		use serde::ser::SerializeMap;
		let mut map = serializer.serialize_map(Some(1))?;
		map.serialize_entry(self.wire_type, &self.body)?;
		map.end()
	}
}

pub type GatewayResult<T> = Result<T, GatewayError>;
