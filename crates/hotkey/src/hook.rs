//! Low-level keyboard hook
//!
//! `WH_KEYBOARD_LL` callbacks carry no user pointer, so the key sink lives
//! in a process-wide slot. Only one hook may be installed at a time.

use crate::{HotkeyError, HotkeyResult, KeyEvent, KeySink, Modifiers};
use crossbeam_channel::{bounded, Sender};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashSet;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};
use windows::Win32::Foundation::{LPARAM, LRESULT, WPARAM};
use windows::Win32::System::Threading::GetCurrentThreadId;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    GetAsyncKeyState, GetKeyState, VK_CAPITAL, VK_CONTROL, VK_LWIN, VK_MENU, VK_RWIN, VK_SHIFT,
};
use windows::Win32::UI::WindowsAndMessaging::{
    CallNextHookEx, DispatchMessageW, GetMessageW, PeekMessageW, PostThreadMessageW,
    SetWindowsHookExW, TranslateMessage, UnhookWindowsHookEx, KBDLLHOOKSTRUCT, MSG, PM_NOREMOVE,
    WH_KEYBOARD_LL, WM_KEYDOWN, WM_KEYUP, WM_QUIT, WM_SYSKEYDOWN, WM_SYSKEYUP,
};

static SINK: Lazy<Mutex<Option<KeySink>>> = Lazy::new(|| Mutex::new(None));

thread_local! {
    // keys currently held; a second key-down without key-up is auto-repeat
    static PRESSED: RefCell<HashSet<u32>> = RefCell::new(HashSet::new());
}

/// Installed hook with its message-loop thread. Dropping it uninstalls.
pub struct KeyboardHook {
    thread_id: u32,
    thread: Option<JoinHandle<()>>,
}

impl KeyboardHook {
    /// Install the hook; `sink` runs on the hook thread for every key-down.
    pub fn spawn(sink: KeySink) -> HotkeyResult<Self> {
        {
            let mut slot = SINK.lock();
            if slot.is_some() {
                return Err(HotkeyError::HookUnavailable("hook already installed".into()));
            }
            *slot = Some(sink);
        }

        let (ready_tx, ready_rx) = bounded::<HotkeyResult<u32>>(1);
        let thread = thread::Builder::new()
            .name("keyboard-hook".into())
            .spawn(move || hook_thread(ready_tx))
            .map_err(|e| {
                SINK.lock().take();
                HotkeyError::HookUnavailable(e.to_string())
            })?;

        let result = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(HotkeyError::HookUnavailable("hook thread exited".into())));

        match result {
            Ok(thread_id) => {
                info!(event = "hotkey.hook.installed", thread_id);
                Ok(Self {
                    thread_id,
                    thread: Some(thread),
                })
            }
            Err(e) => {
                let _ = thread.join();
                SINK.lock().take();
                Err(e)
            }
        }
    }
}

impl Drop for KeyboardHook {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = PostThreadMessageW(self.thread_id, WM_QUIT, WPARAM(0), LPARAM(0)) {
                warn!(event = "hotkey.hook.quit_post_failed", error = %e);
            }
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        SINK.lock().take();
        debug!(event = "hotkey.hook.removed");
    }
}

fn hook_thread(ready: Sender<HotkeyResult<u32>>) {
    unsafe {
        // create the thread's message queue before reporting its id
        let mut msg = MSG::default();
        let _ = PeekMessageW(&mut msg, None, 0, 0, PM_NOREMOVE);

        let hook = match SetWindowsHookExW(WH_KEYBOARD_LL, Some(keyboard_proc), None, 0) {
            Ok(hook) => hook,
            Err(e) => {
                let _ = ready.send(Err(HotkeyError::HookUnavailable(e.to_string())));
                return;
            }
        };
        let _ = ready.send(Ok(GetCurrentThreadId()));

        while GetMessageW(&mut msg, None, 0, 0).as_bool() {
            let _ = TranslateMessage(&msg);
            DispatchMessageW(&msg);
        }

        if let Err(e) = UnhookWindowsHookEx(hook) {
            warn!(event = "hotkey.hook.unhook_failed", error = %e);
        }
    }
}

unsafe extern "system" fn keyboard_proc(n_code: i32, w_param: WPARAM, l_param: LPARAM) -> LRESULT {
    if n_code >= 0 {
        let info = &*(l_param.0 as *const KBDLLHOOKSTRUCT);
        let vk = info.vkCode;

        match w_param.0 as u32 {
            WM_KEYDOWN | WM_SYSKEYDOWN => {
                let is_repeat = PRESSED.with(|keys| !keys.borrow_mut().insert(vk));
                let event = KeyEvent {
                    key_code: vk,
                    modifiers: current_modifiers(),
                    is_repeat,
                    is_modifier_key: is_modifier_vk(vk),
                };
                let sink = SINK.lock().clone();
                if let Some(sink) = sink {
                    sink(event);
                }
            }
            WM_KEYUP | WM_SYSKEYUP => {
                PRESSED.with(|keys| keys.borrow_mut().remove(&vk));
            }
            _ => {}
        }
    }

    CallNextHookEx(None, n_code, w_param, l_param)
}

fn is_down(vk: u16) -> bool {
    unsafe { GetAsyncKeyState(vk as i32) < 0 }
}

fn current_modifiers() -> Modifiers {
    let mut modifiers = Modifiers::NONE;
    if is_down(VK_CONTROL.0) {
        modifiers.insert(Modifiers::CONTROL);
    }
    if is_down(VK_MENU.0) {
        modifiers.insert(Modifiers::OPTION);
    }
    if is_down(VK_SHIFT.0) {
        modifiers.insert(Modifiers::SHIFT);
    }
    if is_down(VK_LWIN.0) || is_down(VK_RWIN.0) {
        modifiers.insert(Modifiers::COMMAND);
    }
    if unsafe { GetKeyState(VK_CAPITAL.0 as i32) } & 1 != 0 {
        modifiers.insert(Modifiers::CAPS_LOCK);
    }
    modifiers
}

fn is_modifier_vk(vk: u32) -> bool {
    matches!(
        vk,
        0x10..=0x12 // Shift, Ctrl, Alt
            | 0x14 // Caps Lock
            | 0x5B | 0x5C // Win
            | 0xA0..=0xA5 // left/right variants
    )
}
