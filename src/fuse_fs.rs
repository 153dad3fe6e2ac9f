//! Thin FUSE binding: the kernel-facing dispatcher that turns POSIX calls
//! into read-path-integrator calls (for `read`) or direct pass-through onto
//! the backing directory (everything else). This is explicitly the "outer
//! collaborator" layer; it exists so `quark` is a runnable mount command,
//! not a hard-core subsystem in its own right.

use std::collections::HashMap;
use std::ffi::{CString, OsStr};
use std::fs;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty, ReplyEntry,
    ReplyOpen, ReplyStatfs, ReplyWrite, ReplyXattr, Request,
};
use libc::{EACCES, EIO, EINVAL, ENOENT};

use crate::integrator::ReadIntegrator;

const TTL: Duration = Duration::from_secs(1);
const ROOT_INODE: u64 = 1;

/// Maps FUSE inode numbers to backing paths relative to the mount root.
/// Inodes are assigned lazily on first lookup and never recycled; this is
/// adequate for a pass-through mount that doesn't persist across restarts.
struct InodeTable {
    next: AtomicU64,
    paths: Mutex<HashMap<u64, PathBuf>>,
}

impl InodeTable {
    fn new() -> Self {
        let mut paths = HashMap::new();
        paths.insert(ROOT_INODE, PathBuf::new());
        Self {
            next: AtomicU64::new(ROOT_INODE + 1),
            paths: Mutex::new(paths),
        }
    }

    fn path_of(&self, ino: u64) -> Option<PathBuf> {
        self.paths.lock().expect("inode table poisoned").get(&ino).cloned()
    }

    fn intern(&self, relative: PathBuf) -> u64 {
        let mut paths = self.paths.lock().expect("inode table poisoned");
        if let Some((&ino, _)) = paths.iter().find(|(_, p)| **p == relative) {
            return ino;
        }
        let ino = self.next.fetch_add(1, Ordering::Relaxed);
        paths.insert(ino, relative);
        ino
    }
}

/// Quark's FUSE filesystem: a pass-through to `root` for every operation
/// except reads, which route through a [`ReadIntegrator`] first.
pub struct QuarkFilesystem {
    root: PathBuf,
    integrator: ReadIntegrator,
    inodes: InodeTable,
}

impl QuarkFilesystem {
    pub fn new(root: PathBuf, integrator: ReadIntegrator) -> Self {
        Self {
            root,
            integrator,
            inodes: InodeTable::new(),
        }
    }

    fn full_path(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    fn attr_for(&self, ino: u64, metadata: &fs::Metadata) -> FileAttr {
        use std::os::unix::fs::MetadataExt;

        let kind = if metadata.is_dir() {
            FileType::Directory
        } else if metadata.file_type().is_symlink() {
            FileType::Symlink
        } else {
            FileType::RegularFile
        };

        FileAttr {
            ino,
            size: metadata.len(),
            blocks: metadata.blocks(),
            atime: metadata.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
            mtime: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            ctime: SystemTime::UNIX_EPOCH + Duration::from_secs(metadata.ctime().max(0) as u64),
            crtime: SystemTime::UNIX_EPOCH,
            kind,
            perm: (metadata.mode() & 0o7777) as u16,
            nlink: metadata.nlink() as u32,
            uid: metadata.uid(),
            gid: metadata.gid(),
            rdev: metadata.rdev() as u32,
            blksize: 512,
            flags: 0,
        }
    }
}

fn errno_for(err: &io::Error) -> i32 {
    match err.kind() {
        io::ErrorKind::NotFound => ENOENT,
        io::ErrorKind::PermissionDenied => EACCES,
        _ => EIO,
    }
}

/// errno left behind by the last failing `libc::getxattr`/`listxattr` call.
/// The kernel already distinguishes "attribute absent" (`ENODATA`) from
/// "xattrs not supported on this filesystem" (`ENOTSUP`); pass it through
/// unchanged rather than collapsing both into one error.
fn last_xattr_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(EIO)
}

impl Filesystem for QuarkFilesystem {
    fn lookup(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(ENOENT);
            return;
        };
        let relative = parent_path.join(name);
        let full = self.full_path(&relative);

        match fs::symlink_metadata(&full) {
            Ok(metadata) => {
                let ino = self.inodes.intern(relative);
                reply.entry(&TTL, &self.attr_for(ino, &metadata), 0);
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn getattr(&mut self, _req: &Request, ino: u64, reply: ReplyAttr) {
        let Some(relative) = self.inodes.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        match fs::symlink_metadata(self.full_path(&relative)) {
            Ok(metadata) => reply.attr(&TTL, &self.attr_for(ino, &metadata)),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn readlink(&mut self, _req: &Request, ino: u64, reply: ReplyData) {
        let Some(relative) = self.inodes.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        match fs::read_link(self.full_path(&relative)) {
            Ok(target) => reply.data(target.as_os_str().as_bytes()),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn open(&mut self, _req: &Request, _ino: u64, _flags: i32, reply: ReplyOpen) {
        reply.opened(0, 0);
    }

    fn read(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(relative) = self.inodes.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        let raw_path = relative.to_string_lossy().into_owned();

        match self
            .integrator
            .read(&raw_path, size as usize, offset.max(0) as usize)
        {
            Ok(bytes) => reply.data(&bytes),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn write(
        &mut self,
        _req: &Request,
        ino: u64,
        _fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        use std::io::{Seek, SeekFrom, Write};

        let Some(relative) = self.inodes.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        let full = self.full_path(&relative);

        let result = (|| -> io::Result<u32> {
            let mut file = fs::OpenOptions::new().write(true).open(&full)?;
            file.seek(SeekFrom::Start(offset.max(0) as u64))?;
            file.write_all(data)?;
            Ok(data.len() as u32)
        })();

        match result {
            Ok(written) => reply.written(written),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn readdir(&mut self, _req: &Request, ino: u64, _fh: u64, offset: i64, mut reply: ReplyDirectory) {
        let Some(relative) = self.inodes.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        let full = self.full_path(&relative);

        let entries = match fs::read_dir(&full) {
            Ok(entries) => entries,
            Err(err) => {
                reply.error(errno_for(&err));
                return;
            }
        };

        let mut listing: Vec<(PathBuf, FileType)> = vec![
            (relative.clone(), FileType::Directory),
            (relative.clone(), FileType::Directory),
        ];
        for entry in entries.flatten() {
            let child_relative = relative.join(entry.file_name());
            let kind = match entry.file_type() {
                Ok(ft) if ft.is_dir() => FileType::Directory,
                Ok(ft) if ft.is_symlink() => FileType::Symlink,
                _ => FileType::RegularFile,
            };
            listing.push((child_relative, kind));
        }

        for (i, (child_relative, kind)) in listing.into_iter().enumerate().skip(offset as usize) {
            let name = child_relative
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| OsStr::new(".").to_os_string());
            let child_ino = self.inodes.intern(child_relative);
            if reply.add(child_ino, (i + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn create(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        mode: u32,
        _umask: u32,
        _flags: i32,
        reply: fuser::ReplyCreate,
    ) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(ENOENT);
            return;
        };
        let relative = parent_path.join(name);
        let full = self.full_path(&relative);

        let result = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&full)
            .and_then(|_| fs::set_permissions(&full, fs::Permissions::from_mode(mode)))
            .and_then(|_| fs::symlink_metadata(&full));

        match result {
            Ok(metadata) => {
                let ino = self.inodes.intern(relative);
                reply.created(&TTL, &self.attr_for(ino, &metadata), 0, 0, 0);
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn unlink(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(ENOENT);
            return;
        };
        match fs::remove_file(self.full_path(&parent_path.join(name))) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn mkdir(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(ENOENT);
            return;
        };
        let relative = parent_path.join(name);
        let full = self.full_path(&relative);

        match fs::create_dir(&full).and_then(|_| fs::symlink_metadata(&full)) {
            Ok(metadata) => {
                let ino = self.inodes.intern(relative);
                reply.entry(&TTL, &self.attr_for(ino, &metadata), 0);
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn rmdir(&mut self, _req: &Request, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(ENOENT);
            return;
        };
        match fs::remove_dir(self.full_path(&parent_path.join(name))) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn rename(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        let (Some(from_parent), Some(to_parent)) =
            (self.inodes.path_of(parent), self.inodes.path_of(newparent))
        else {
            reply.error(ENOENT);
            return;
        };
        let from = self.full_path(&from_parent.join(name));
        let to = self.full_path(&to_parent.join(newname));

        match fs::rename(&from, &to) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn symlink(
        &mut self,
        _req: &Request,
        parent: u64,
        name: &OsStr,
        link: &Path,
        reply: ReplyEntry,
    ) {
        let Some(parent_path) = self.inodes.path_of(parent) else {
            reply.error(ENOENT);
            return;
        };
        let relative = parent_path.join(name);
        let full = self.full_path(&relative);

        match std::os::unix::fs::symlink(link, &full).and_then(|_| fs::symlink_metadata(&full)) {
            Ok(metadata) => {
                let ino = self.inodes.intern(relative);
                reply.entry(&TTL, &self.attr_for(ino, &metadata), 0);
            }
            Err(err) => reply.error(errno_for(&err)),
        }
    }

    fn statfs(&mut self, _req: &Request, _ino: u64, reply: ReplyStatfs) {
        // The backing filesystem's real statvfs isn't exposed through std;
        // report conservative placeholder capacity rather than failing the
        // call outright.
        reply.statfs(0, 0, 0, 0, 0, 512, 255, 0);
    }

    fn access(&mut self, _req: &Request, ino: u64, _mask: i32, reply: ReplyEmpty) {
        match self.inodes.path_of(ino) {
            Some(relative) if self.full_path(&relative).exists() => reply.ok(),
            Some(_) => reply.error(ENOENT),
            None => reply.error(ENOENT),
        }
    }

    fn getxattr(
        &mut self,
        _req: &Request,
        ino: u64,
        name: &OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        let Some(relative) = self.inodes.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        let (Ok(full), Ok(name)) = (
            CString::new(self.full_path(&relative).as_os_str().as_bytes()),
            CString::new(name.as_bytes()),
        ) else {
            reply.error(EINVAL);
            return;
        };

        let needed =
            unsafe { libc::getxattr(full.as_ptr(), name.as_ptr(), std::ptr::null_mut(), 0) };
        if needed < 0 {
            reply.error(last_xattr_errno());
            return;
        }
        let needed = needed as usize;

        if size == 0 {
            reply.size(needed as u32);
            return;
        }
        if (size as usize) < needed {
            reply.error(libc::ERANGE);
            return;
        }

        let mut buffer = vec![0u8; needed];
        let written = unsafe {
            libc::getxattr(
                full.as_ptr(),
                name.as_ptr(),
                buffer.as_mut_ptr() as *mut libc::c_void,
                needed,
            )
        };
        if written < 0 {
            reply.error(last_xattr_errno());
            return;
        }
        buffer.truncate(written as usize);
        reply.data(&buffer);
    }

    fn listxattr(&mut self, _req: &Request, ino: u64, size: u32, reply: ReplyXattr) {
        let Some(relative) = self.inodes.path_of(ino) else {
            reply.error(ENOENT);
            return;
        };
        let Ok(full) = CString::new(self.full_path(&relative).as_os_str().as_bytes()) else {
            reply.error(EINVAL);
            return;
        };

        let needed = unsafe { libc::listxattr(full.as_ptr(), std::ptr::null_mut(), 0) };
        if needed < 0 {
            reply.error(last_xattr_errno());
            return;
        }
        let needed = needed as usize;

        if size == 0 {
            reply.size(needed as u32);
            return;
        }
        if (size as usize) < needed {
            reply.error(libc::ERANGE);
            return;
        }

        let mut buffer = vec![0u8; needed];
        let written = unsafe {
            libc::listxattr(full.as_ptr(), buffer.as_mut_ptr() as *mut libc::c_char, needed)
        };
        if written < 0 {
            reply.error(last_xattr_errno());
            return;
        }
        buffer.truncate(written as usize);
        reply.data(&buffer);
    }
}
