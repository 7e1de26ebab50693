use std::path::Path;

use serde_json::Value;

use crate::abi::{self, AbiType, AbiValue, Calldata};
use crate::error::{Error, Result};
use crate::types::{decode_hex, Address};

/// Every function of the PolyEndpoint registry contract this tool calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Function {
	AddEndpoint,
	RemoveEndpoint,
	AddAdmin,
	RemoveAdmin,
	TransferOwnership,
	GetEndpointCount,
	GetAllEndpoints,
	GetEndpoint,
	HasEndpoint,
	Owner,
	Admins,
}

impl Function {
	pub const ALL: [Function; 11] = [
		Self::AddEndpoint,
		Self::RemoveEndpoint,
		Self::AddAdmin,
		Self::RemoveAdmin,
		Self::TransferOwnership,
		Self::GetEndpointCount,
		Self::GetAllEndpoints,
		Self::GetEndpoint,
		Self::HasEndpoint,
		Self::Owner,
		Self::Admins,
	];

	pub fn name(self) -> &'static str {
		match self {
			Self::AddEndpoint => "addEndpoint",
			Self::RemoveEndpoint => "removeEndpoint",
			Self::AddAdmin => "addAdmin",
			Self::RemoveAdmin => "removeAdmin",
			Self::TransferOwnership => "transferOwnership",
			Self::GetEndpointCount => "getEndpointCount",
			Self::GetAllEndpoints => "getAllEndpoints",
			Self::GetEndpoint => "getEndpoint",
			Self::HasEndpoint => "hasEndpoint",
			Self::Owner => "owner",
			Self::Admins => "admins",
		}
	}

	/// Ordered parameter types.
	pub fn inputs(self) -> Vec<AbiType> {
		match self {
			Self::AddEndpoint | Self::RemoveEndpoint | Self::HasEndpoint => vec![AbiType::String],
			Self::AddAdmin | Self::RemoveAdmin | Self::TransferOwnership | Self::Admins => {
				vec![AbiType::Address]
			}
			Self::GetEndpoint => vec![AbiType::Uint256],
			Self::GetEndpointCount | Self::GetAllEndpoints | Self::Owner => vec![],
		}
	}

	pub fn outputs(self) -> Vec<AbiType> {
		match self {
			Self::AddEndpoint
			| Self::RemoveEndpoint
			| Self::AddAdmin
			| Self::RemoveAdmin
			| Self::TransferOwnership => vec![],
			Self::GetEndpointCount => vec![AbiType::Uint256],
			Self::GetAllEndpoints => vec![AbiType::Array(Box::new(AbiType::String))],
			Self::GetEndpoint => vec![AbiType::String],
			Self::HasEndpoint | Self::Admins => vec![AbiType::Bool],
			Self::Owner => vec![AbiType::Address],
		}
	}

	/// Read-only functions go through `eth_call` and never need a key.
	pub fn is_view(self) -> bool {
		self.outputs().len() == 1
	}

	/// Canonical signature, e.g. `addEndpoint(string)`.
	pub fn signature(self) -> String {
		let params: Vec<String> = self.inputs().iter().map(ToString::to_string).collect();
		format!("{}({})", self.name(), params.join(","))
	}

	pub fn selector(self) -> [u8; 4] {
		abi::selector(&self.signature())
	}

	pub fn from_selector(selector: [u8; 4]) -> Option<Self> {
		Self::ALL.into_iter().find(|f| f.selector() == selector)
	}

	pub fn encode(self, args: &[AbiValue]) -> Result<Calldata> {
		let encoded_args = abi::encode_args(&self.inputs(), args)
			.map_err(|e| Error::InvalidArgument(format!("{}: {e}", self.signature())))?;
		Ok(Calldata {
			selector: self.selector(),
			encoded_args,
		})
	}

	/// Decode the arguments of a call to this function.
	pub fn decode_input(self, calldata: &[u8]) -> Result<Vec<AbiValue>> {
		let (sel, args) = calldata
			.split_first_chunk::<4>()
			.ok_or_else(|| Error::Decode("calldata shorter than a selector".into()))?;
		if *sel != self.selector() {
			return Err(Error::Decode(format!(
				"selector 0x{} does not belong to {}",
				hex::encode(sel),
				self.signature()
			)));
		}
		abi::decode_args(&self.inputs(), args)
	}

	pub fn decode_output(self, data: &[u8]) -> Result<Vec<AbiValue>> {
		abi::decode_args(&self.outputs(), data)
	}
}

/// A registry deployment the tool knows about.
pub struct Deployment {
	pub network: &'static str,
	pub chain_id: u64,
	pub address: &'static str,
}

/// Known registry deployments, used when `--contract` is omitted.
pub static DEPLOYMENTS: &[Deployment] = &[Deployment {
	network: "base-sepolia",
	chain_id: 84_532,
	address: "0xdcc474b1f6aecbbe140803255155762dd7783e59",
}];

pub fn deployment_for(chain_id: u64) -> Option<Address> {
	DEPLOYMENTS
		.iter()
		.find(|d| d.chain_id == chain_id)
		.and_then(|d| d.address.parse().ok())
}

/// Read creation bytecode from a compiled contract artifact.  Both
/// `"bytecode": "0x.."` and `"bytecode": { "object": "0x.." }` layouts are
/// accepted.
pub fn load_bytecode(path: &Path) -> Result<Vec<u8>> {
	let content = std::fs::read_to_string(path)?;
	let artifact: Value = serde_json::from_str(&content).map_err(|e| {
		Error::InvalidArgument(format!("{} is not valid JSON: {e}", path.display()))
	})?;
	let code = match artifact.get("bytecode") {
		Some(Value::String(s)) => s.as_str(),
		Some(Value::Object(obj)) => obj.get("object").and_then(Value::as_str).unwrap_or_default(),
		_ => "",
	};
	let bytes = decode_hex(code)?;
	if bytes.is_empty() {
		return Err(Error::InvalidArgument(format!(
			"{} has no deployable bytecode",
			path.display()
		)));
	}
	Ok(bytes)
}
