use thiserror::Error;

/// Contract violations reported by the component runtime.
#[derive(Debug, Error)]
pub enum Error {
	#[error("component is already mounted")]
	AlreadyMounted,
	#[error("component is not mounted")]
	NotMounted,
	#[error("no element with id `{0}` to mount onto")]
	TargetNotFound(String),
	#[error(transparent)]
	Dom(#[from] DomError),
}

/// Failure of a single platform operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
	#[error("property `{0}` is read-only")]
	ReadOnly(String),
	#[error("the operation would yield an incorrect node tree")]
	HierarchyRequest,
	#[error("the node to be replaced or removed is not a child of this node")]
	NotFound,
	#[error("the node is not an element")]
	NotAnElement,
	#[error("`{0}` is not a valid name")]
	InvalidName(String),
	#[error("JavaScript error: {0}")]
	Js(String),
}

#[cfg(target_arch = "wasm32")]
impl From<wasm_bindgen::JsValue> for DomError {
	fn from(value: wasm_bindgen::JsValue) -> Self {
		value.as_string().map_or_else(|| Self::Js(format!("{:?}", value)), Self::Js)
	}
}
