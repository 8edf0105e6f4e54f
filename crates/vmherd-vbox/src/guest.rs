//! Guest command execution through `guestcontrol`

use vmherd_api::GuestOs;

use crate::escape::EscapeMode;
use crate::invocation::{quote_literal, CommandOptions, Invocation};
use crate::runner::ToolVersion;

/// Account used inside the guest when none is given
pub const DEFAULT_GUEST_USER: &str = "Guest";

const WINDOWS_TASKKILL: &str = "%SystemRoot%\\System32\\taskkill.exe /im";
const UNIX_KILLALL: &str = "sudo killall";

/// A command to run inside the guest
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Program or command text handed to the guest shell
    pub exec: String,
    pub args: Vec<String>,
    /// Guest account, [`DEFAULT_GUEST_USER`] if unset
    pub user: Option<String>,
    pub password: Option<String>,
    /// Extra `guestcontrol` options
    pub options: CommandOptions,
}

impl ExecOptions {
    pub fn new(exec: impl Into<String>) -> Self {
        Self {
            exec: exec.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn credentials(mut self, user: impl Into<String>, password: Option<String>) -> Self {
        self.user = Some(user.into());
        self.password = password;
        self
    }

    /// Command that kills `process` by image name on `os`
    pub fn kill(process: &str, os: GuestOs, options: CommandOptions) -> Self {
        let exec = match os {
            GuestOs::Windows => WINDOWS_TASKKILL,
            GuestOs::Mac | GuestOs::Linux => UNIX_KILLALL,
        };

        Self {
            exec: exec.to_string(),
            args: vec![process.to_string()],
            user: None,
            password: None,
            options: CommandOptions::new()
                .flag("no-wait-stdout")
                .flag("no-wait-stderr")
                .merge(options),
        }
    }

    fn command_text(&self) -> String {
        let mut text = self.exec.clone();
        for arg in &self.args {
            text.push(' ');
            text.push_str(arg);
        }
        text
    }
}

/// Shell program and its leading arguments for `os`
fn guest_shell(os: GuestOs) -> (&'static str, &'static [&'static str]) {
    match os {
        GuestOs::Windows => ("cmd.exe", &["cmd.exe", "/c"]),
        GuestOs::Mac => ("/usr/bin/open", &["/usr/bin/open", "-a"]),
        GuestOs::Linux => ("/bin/sh", &["/bin/sh", "-c"]),
    }
}

/// One guest-side argument as the host shell must receive it
fn host_word(value: &str, mode: EscapeMode) -> String {
    match mode {
        // `sh -c` folds the literal's doubled backslashes back
        EscapeMode::Posix => quote_literal(value),
        // `cmd /C` keeps backslashes as they are
        EscapeMode::Windows => mode.escape(value).into_owned(),
    }
}

/// Build the `guestcontrol` invocation running `exec` in machine `vm_literal`,
/// quoted for a host shell using `mode`
pub fn exec_invocation(
    vm_literal: &str,
    os: GuestOs,
    version: &ToolVersion,
    mode: EscapeMode,
    exec: &ExecOptions,
) -> Invocation {
    let (program, leading) = guest_shell(os);

    let inv = Invocation::new("guestcontrol").arg(vm_literal);
    let inv = if version.has_guest_run() {
        inv.arg("run").value("exe", program)
    } else {
        inv.arg("execute").value("image", program)
    };

    let mut inv = inv.value(
        "username",
        exec.user.as_deref().unwrap_or(DEFAULT_GUEST_USER),
    );
    if let Some(password) = &exec.password {
        inv = inv.value("password", password);
    }

    let command = match os {
        GuestOs::Windows | GuestOs::Linux => host_word(&exec.command_text(), mode),
        GuestOs::Mac => {
            let mut parts = vec![host_word(&exec.exec, mode)];
            parts.extend(exec.args.iter().map(|a| host_word(a, mode)));
            parts.join(" ")
        }
    };

    inv.options(exec.options.clone())
        .trailing(leading.iter().copied())
        .trailing([command])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modern() -> ToolVersion {
        ToolVersion::parse("6.1.38")
    }

    fn line(inv: &Invocation) -> String {
        inv.command_line("vboxmanage", EscapeMode::Posix)
    }

    #[test]
    fn linux_exec_runs_through_sh() {
        let exec = ExecOptions::new("ls").arg("-la").arg("/tmp");
        let inv = exec_invocation("\"vm\"", GuestOs::Linux, &modern(), EscapeMode::Posix, &exec);

        assert_eq!(
            line(&inv),
            "vboxmanage guestcontrol \"vm\" run --exe /bin/sh --username Guest -- /bin/sh -c \"ls -la /tmp\""
        );
    }

    #[test]
    fn windows_exec_doubles_backslashes() {
        let exec = ExecOptions::new("C:\\tools\\app.exe")
            .credentials("admin", Some("secret".into()));
        let inv = exec_invocation("\"win\"", GuestOs::Windows, &modern(), EscapeMode::Posix, &exec);

        assert_eq!(
            line(&inv),
            "vboxmanage guestcontrol \"win\" run --exe cmd.exe --username admin --password secret -- cmd.exe /c \"C:\\\\tools\\\\app.exe\""
        );
    }

    #[test]
    fn windows_host_keeps_backslashes() {
        let exec = ExecOptions::new("C:\\tools\\app.exe").arg("--full screen");
        let inv = exec_invocation("\"win\"", GuestOs::Windows, &modern(), EscapeMode::Windows, &exec);

        assert!(
            inv.command_line("VBoxManage.exe", EscapeMode::Windows)
                .ends_with("-- cmd.exe /c \"C:\\tools\\app.exe --full screen\"")
        );

        let exec = ExecOptions::new("C:\\tools\\app.exe");
        let inv = exec_invocation("\"win\"", GuestOs::Windows, &modern(), EscapeMode::Windows, &exec);
        assert!(
            inv.command_line("VBoxManage.exe", EscapeMode::Windows)
                .ends_with("-- cmd.exe /c C:\\tools\\app.exe")
        );
    }

    #[test]
    fn mac_exec_opens_application() {
        let exec = ExecOptions::new("Safari");
        let inv = exec_invocation("\"mac\"", GuestOs::Mac, &modern(), EscapeMode::Posix, &exec);
        assert!(line(&inv).ends_with("--exe /usr/bin/open --username Guest -- /usr/bin/open -a \"Safari\""));
    }

    #[test]
    fn old_tools_use_execute_image() {
        let exec = ExecOptions::new("ls");
        let inv = exec_invocation("\"vm\"", GuestOs::Linux, &ToolVersion::parse("4.3.40"), EscapeMode::Posix, &exec);
        assert!(line(&inv).contains(" execute --image /bin/sh "));
    }

    #[test]
    fn kill_uses_platform_tool() {
        let kill = ExecOptions::kill("notepad.exe", GuestOs::Windows, CommandOptions::new());
        let inv = exec_invocation("\"win\"", GuestOs::Windows, &modern(), EscapeMode::Posix, &kill);
        let rendered = line(&inv);

        assert!(rendered.contains("--no-wait-stdout --no-wait-stderr"));
        assert!(rendered.ends_with(
            "-- cmd.exe /c \"%SystemRoot%\\\\System32\\\\taskkill.exe /im notepad.exe\""
        ));

        let kill = ExecOptions::kill("firefox", GuestOs::Linux, CommandOptions::new());
        assert_eq!(kill.command_text(), "sudo killall firefox");
    }
}
