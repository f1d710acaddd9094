use std::process::ExitCode;

use crate::Error;

/// sysexits-style code for a failed command.
pub fn exit_code(err: &Error) -> ExitCode {
    match err {
        Error::CreateDir { .. } => ExitCode::from(73),
        Error::ReadConfig { .. } => ExitCode::from(74),
        Error::ParseConfig { .. } => ExitCode::from(65),
        Error::InvalidConfig { .. } => ExitCode::from(65),
        Error::ExplicitConfigMissing { .. } => ExitCode::from(66),
        Error::ConfigDiscoveryFailed { .. } => ExitCode::from(66),
        Error::WorkingDirectoryUnavailable { .. } => ExitCode::from(70),
        Error::HomeUnavailable => ExitCode::from(78),
        Error::NameCollision { .. } => ExitCode::from(65),
        Error::ServicesUnavailable { .. } => ExitCode::from(69),
        Error::EngineUnavailable { .. } => ExitCode::from(69),
        Error::HookVeto { .. } => ExitCode::from(70),
        Error::Engine { .. } => ExitCode::from(70),
        Error::ContainerNotFound { .. } => ExitCode::from(70),
        Error::UnknownComponent { .. } => ExitCode::from(64),
        Error::ComponentNotInstalled { .. } => ExitCode::from(70),
        Error::IdentityRead { .. } => ExitCode::from(74),
        Error::IdentityWrite { .. } => ExitCode::from(73),
        Error::ComponentFailed { source, .. } => exit_code(source),
        Error::ComponentFailures { .. } => ExitCode::from(70),
        Error::RegistryRead { .. } => ExitCode::from(74),
        Error::RegistryWrite { .. } => ExitCode::from(73),
        Error::UnknownAppDir { .. } => ExitCode::from(66),
        Error::DuplicateApp { .. } => ExitCode::from(65),
        Error::AppNotFound { .. } => ExitCode::from(66),
        Error::UnknownPlugin { .. } => ExitCode::from(78),
        Error::PluginLoad { .. } => ExitCode::from(78),
    }
}
